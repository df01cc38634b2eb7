use crate::error::{AppError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tiff", "tif"];

/// The physical frame source behind a capture session. Abstracting the
/// device keeps the session state machine testable with doubles.
pub trait CaptureDevice: Send + Sync + 'static {
    /// Ask the platform for access to the device. Resolves to whether
    /// access was granted.
    fn request_access(&self) -> impl Future<Output = bool> + Send;

    /// Produce one raw image. Errors map to transient capture failures.
    fn acquire_frame(&self) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Release the underlying resource. Called on session teardown.
    fn release(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    PermissionPending = 1,
    /// Terminal: every subsequent capture request fails.
    PermissionDenied = 2,
    Configuring = 3,
    /// Running, no capture in flight.
    Idle = 4,
    /// Running, one capture in flight.
    Capturing = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> SessionState {
        match value {
            1 => SessionState::PermissionPending,
            2 => SessionState::PermissionDenied,
            3 => SessionState::Configuring,
            4 => SessionState::Idle,
            5 => SessionState::Capturing,
            _ => SessionState::Uninitialized,
        }
    }
}

/// Owns the capture device lifecycle and produces one raw image per
/// request. State transitions use atomic compare-and-swap so a
/// concurrent second capture is rejected without reaching the device.
pub struct CaptureSession<D: CaptureDevice> {
    device: D,
    state: AtomicU8,
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: AtomicU8::new(SessionState::Uninitialized as u8),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Ask the device for access. Granted moves the session to
    /// `Configuring`; denied is terminal.
    pub async fn request_permission(&self) -> Result<()> {
        match self.state() {
            SessionState::Uninitialized => {}
            SessionState::PermissionDenied => return Err(AppError::PermissionDenied),
            // Already past the permission gate.
            _ => return Ok(()),
        }
        if !self.transition(SessionState::Uninitialized, SessionState::PermissionPending) {
            // Lost the race; re-evaluate whatever state won.
            return match self.state() {
                SessionState::PermissionDenied => Err(AppError::PermissionDenied),
                _ => Ok(()),
            };
        }

        if self.device.request_access().await {
            self.state
                .store(SessionState::Configuring as u8, Ordering::Release);
            Ok(())
        } else {
            self.state
                .store(SessionState::PermissionDenied as u8, Ordering::Release);
            tracing::warn!("capture device access denied");
            Err(AppError::PermissionDenied)
        }
    }

    /// Begin the device stream. Idempotent once running.
    pub fn start(&self) -> Result<()> {
        match self.state() {
            SessionState::Configuring => {
                self.transition(SessionState::Configuring, SessionState::Idle);
                Ok(())
            }
            SessionState::Idle | SessionState::Capturing => Ok(()),
            SessionState::PermissionDenied => Err(AppError::PermissionDenied),
            SessionState::Uninitialized | SessionState::PermissionPending => {
                Err(AppError::InvalidState("permission not granted"))
            }
        }
    }

    /// Produce one raw image. Only one capture may be outstanding; a
    /// concurrent call fails immediately without touching the device.
    pub async fn capture(&self) -> Result<Vec<u8>> {
        if !self.transition(SessionState::Idle, SessionState::Capturing) {
            return match self.state() {
                SessionState::PermissionDenied => Err(AppError::PermissionDenied),
                SessionState::Capturing => {
                    Err(AppError::CaptureFailure("capture already in flight".into()))
                }
                _ => Err(AppError::CaptureFailure("session not running".into())),
            };
        }

        let frame = self.device.acquire_frame().await;
        // Return to Idle whether the device succeeded or not.
        self.transition(SessionState::Capturing, SessionState::Idle);

        frame.map_err(|e| match e {
            AppError::CaptureFailure(_) => e,
            other => AppError::CaptureFailure(other.to_string()),
        })
    }

    /// Tear the session down and release the device.
    pub fn shutdown(&self) {
        self.device.release();
        self.state
            .store(SessionState::Uninitialized as u8, Ordering::Release);
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.device.release();
    }
}

/// Desktop capture device backed by a watched directory: each frame is
/// the most recently modified image file in the source folder.
#[derive(Clone)]
pub struct DirectoryCaptureDevice {
    dir: PathBuf,
}

impl DirectoryCaptureDevice {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn newest_image(&self) -> Result<PathBuf> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| {
            AppError::CaptureFailure(format!("cannot read {}: {}", self.dir.display(), e))
        })?;

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !is_image_file(&path) {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                newest = Some((modified, path));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| AppError::CaptureFailure("no image available in source folder".into()))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl CaptureDevice for DirectoryCaptureDevice {
    async fn request_access(&self) -> bool {
        self.dir.is_dir()
    }

    async fn acquire_frame(&self) -> Result<Vec<u8>> {
        let path = self.newest_image()?;
        tokio::fs::read(&path).await.map_err(|e| {
            AppError::CaptureFailure(format!("cannot read {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Device double: configurable grant, counted frames, optional gate
    /// holding acquisitions open.
    #[derive(Clone)]
    struct FakeDevice {
        grant: bool,
        acquisitions: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeDevice {
        fn granted() -> Self {
            Self {
                grant: true,
                acquisitions: Arc::new(AtomicUsize::new(0)),
                gate: None,
            }
        }

        fn denied() -> Self {
            Self {
                grant: false,
                acquisitions: Arc::new(AtomicUsize::new(0)),
                gate: None,
            }
        }
    }

    impl CaptureDevice for FakeDevice {
        async fn request_access(&self) -> bool {
            self.grant
        }

        async fn acquire_frame(&self) -> Result<Vec<u8>> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(vec![0xFF, 0xD8])
        }
    }

    #[tokio::test]
    async fn denied_permission_is_terminal() {
        let session = CaptureSession::new(FakeDevice::denied());
        assert!(matches!(
            session.request_permission().await,
            Err(AppError::PermissionDenied)
        ));
        assert_eq!(session.state(), SessionState::PermissionDenied);

        // Subsequent operations keep failing with PermissionDenied.
        assert!(matches!(
            session.request_permission().await,
            Err(AppError::PermissionDenied)
        ));
        assert!(matches!(session.start(), Err(AppError::PermissionDenied)));
        assert!(matches!(
            session.capture().await,
            Err(AppError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn start_is_idempotent_once_running() {
        let session = CaptureSession::new(FakeDevice::granted());
        session.request_permission().await.unwrap();
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn capture_before_start_fails() {
        let session = CaptureSession::new(FakeDevice::granted());
        assert!(matches!(
            session.capture().await,
            Err(AppError::CaptureFailure(_))
        ));
        session.request_permission().await.unwrap();
        assert!(matches!(
            session.capture().await,
            Err(AppError::CaptureFailure(_))
        ));
    }

    #[tokio::test]
    async fn capture_produces_a_frame_and_returns_to_idle() {
        let session = CaptureSession::new(FakeDevice::granted());
        session.request_permission().await.unwrap();
        session.start().unwrap();

        let frame = session.capture().await.unwrap();
        assert_eq!(frame, vec![0xFF, 0xD8]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn concurrent_capture_is_single_flight() {
        let gate = Arc::new(Notify::new());
        let device = FakeDevice {
            grant: true,
            acquisitions: Arc::new(AtomicUsize::new(0)),
            gate: Some(gate.clone()),
        };
        let acquisitions = device.acquisitions.clone();

        let session = Arc::new(CaptureSession::new(device));
        session.request_permission().await.unwrap();
        session.start().unwrap();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.capture().await }
        });

        // Wait until the first capture holds the device.
        while acquisitions.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            session.capture().await,
            Err(AppError::CaptureFailure(_))
        ));
        assert_eq!(acquisitions.load(Ordering::SeqCst), 1);

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn directory_device_serves_newest_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.jpg"), b"old").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), b"nope").unwrap();
        // Ensure a later mtime for the newer frame.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::write(dir.path().join("new.png"), b"new").unwrap();

        let device = DirectoryCaptureDevice::new(dir.path());
        assert!(device.request_access().await);
        assert_eq!(device.acquire_frame().await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn directory_device_with_no_images_fails_capture() {
        let dir = tempfile::tempdir().unwrap();
        let device = DirectoryCaptureDevice::new(dir.path());
        assert!(matches!(
            device.acquire_frame().await,
            Err(AppError::CaptureFailure(_))
        ));
    }
}
