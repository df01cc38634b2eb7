use crate::error::{AppError, Result};
use crate::models::entry::ArtifactRef;
use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ARTIFACT_EXT: &str = "jpg";
const JPEG_QUALITY: u8 = 85;

/// Filesystem blob store for captured images. Each artifact is a
/// JPEG-compressed file named by a random id; artifacts are owned
/// independently of any entry.
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            AppError::ArtifactIo(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn path_for(&self, reference: &ArtifactRef) -> PathBuf {
        self.root.join(reference.as_str())
    }

    /// Compress and durably write a captured image, returning the new
    /// reference. Re-encodes to JPEG, honoring any EXIF orientation in
    /// the source bytes.
    pub fn save(&self, bytes: &[u8]) -> Result<ArtifactRef> {
        let encoded = encode_jpeg(bytes)?;

        let reference = ArtifactRef::new(format!("{}.{}", Uuid::new_v4(), ARTIFACT_EXT));
        let path = self.path_for(&reference);

        let mut file = std::fs::File::create(&path).map_err(|e| {
            AppError::ArtifactIo(format!("cannot create {}: {}", path.display(), e))
        })?;
        file.write_all(&encoded)
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                AppError::ArtifactIo(format!("cannot write {}: {}", path.display(), e))
            })?;

        Ok(reference)
    }

    pub fn load(&self, reference: &ArtifactRef) -> Result<Vec<u8>> {
        let path = self.path_for(reference);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(reference.as_str().to_string()))
            }
            Err(e) => Err(AppError::ArtifactIo(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Best-effort removal. Missing files are not an error; other
    /// failures are logged and swallowed.
    pub fn delete(&self, reference: &ArtifactRef) {
        let path = self.path_for(reference);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "artifact delete failed");
            }
        }
    }

    /// Best-effort removal of every artifact in the content directory.
    /// Used by clear-all so orphaned files do not accumulate. Returns
    /// the number of files removed.
    pub fn sweep(&self) -> usize {
        let Ok(read_dir) = std::fs::read_dir(&self.root) else {
            return 0;
        };
        let mut removed = 0;
        for entry in read_dir.flatten() {
            let path = entry.path();
            let is_artifact = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXT))
                .unwrap_or(false);
            if is_artifact && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

/// Decode source bytes, apply EXIF orientation, encode as JPEG.
fn encode_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::ArtifactIo(format!("cannot probe image format: {}", e)))?
        .decode()
        .map_err(|e| AppError::ArtifactIo(format!("cannot decode image: {}", e)))?;

    let img = apply_orientation(img, read_orientation(bytes));

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| AppError::ArtifactIo(format!("cannot encode artifact: {}", e)))?;
    Ok(buffer.into_inner())
}

/// EXIF orientation tag of the source bytes. Defaults to 1 (upright).
fn read_orientation(bytes: &[u8]) -> u32 {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        match field.value {
            exif::Value::Short(ref v) => *v.first().unwrap_or(&1) as u32,
            exif::Value::Long(ref v) => *v.first().unwrap_or(&1),
            _ => 1,
        }
    } else {
        1
    }
}

fn apply_orientation(img: image::DynamicImage, orientation: u32) -> image::DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate90(),
        6 => img.rotate90(),
        7 => img.fliph().rotate270(),
        8 => img.rotate270(),
        _ => img,
    }
}
