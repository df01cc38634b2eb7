use crate::error::{AppError, Result};
use image::ImageReader;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::io::Cursor;

const CROP_PCT: f32 = 0.875;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Convert raw captured bytes into the model's NCHW input tensor:
/// resize shortest edge to ceil(crop_size / crop_pct), center crop,
/// normalize.
pub fn preprocess_bytes(bytes: &[u8], crop_size: u32) -> Result<Array4<f32>> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Inference(format!("failed to probe image format: {}", e)))?
        .decode()
        .map_err(|e| AppError::Inference(format!("failed to decode image: {}", e)))?;

    let resize_size = (crop_size as f32 / CROP_PCT).ceil() as u32;
    let (w, h) = (img.width(), img.height());
    let (new_w, new_h) = if w < h {
        (resize_size, ((h as f32 / w as f32) * resize_size as f32).round() as u32)
    } else {
        (((w as f32 / h as f32) * resize_size as f32).round() as u32, resize_size)
    };
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let crop_x = (new_w.saturating_sub(crop_size)) / 2;
    let crop_y = (new_h.saturating_sub(crop_size)) / 2;
    let cropped = resized.crop_imm(crop_x, crop_y, crop_size, crop_size);
    let rgb = cropped.to_rgb8();

    // Pass 1: normalize pixels sequentially (contiguous reads and writes).
    let raw = rgb.into_raw();
    let hw = (crop_size * crop_size) as usize;
    let mut interleaved = vec![0f32; 3 * hw];
    for (i, pixel) in raw.chunks_exact(3).enumerate() {
        let off = i * 3;
        interleaved[off] = (pixel[0] as f32 / 255.0 - MEAN[0]) / STD[0];
        interleaved[off + 1] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
        interleaved[off + 2] = (pixel[2] as f32 / 255.0 - MEAN[2]) / STD[2];
    }

    // Pass 2: transpose HWC -> CHW in cache-friendly tiles.
    let mut data = vec![0f32; 3 * hw];
    const TILE: usize = 1024;
    for base in (0..hw).step_by(TILE) {
        let end = (base + TILE).min(hw);
        for i in base..end {
            let src = i * 3;
            data[i] = interleaved[src];
            data[hw + i] = interleaved[src + 1];
            data[2 * hw + i] = interleaved[src + 2];
        }
    }

    Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data)
        .map_err(|e| AppError::Inference(format!("failed to create tensor: {}", e)))
}

/// Run the model on a preprocessed tensor and return softmax
/// probabilities over the class indices.
pub fn run_inference(session: &mut Session, input: Array4<f32>) -> Result<Vec<f32>> {
    let input_name = session.inputs()[0].name().to_string();

    let input_tensor = Value::from_array(input)
        .map_err(|e| AppError::Inference(format!("failed to create tensor value: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError::Inference(format!("inference failed: {}", e)))?;

    let output_value = outputs
        .values()
        .next()
        .ok_or_else(|| AppError::Inference("model produced no outputs".into()))?;

    let (_, data) = output_value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError::Inference(format!("failed to extract output tensor: {}", e)))?;

    // Numerically stable softmax over the logits.
    let max_logit = data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = data.iter().map(|&x| (x - max_logit).exp()).sum();
    Ok(data
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 100, 50]),
        ));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn preprocess_produces_expected_shape() {
        let tensor = preprocess_bytes(&png_bytes(640, 480), 224).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn preprocess_handles_portrait_and_tiny_inputs() {
        let tensor = preprocess_bytes(&png_bytes(480, 640), 224).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);

        // Upscaling a tiny frame must still hit the crop size.
        let tensor = preprocess_bytes(&png_bytes(10, 10), 224).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn preprocess_rejects_non_image_bytes() {
        assert!(matches!(
            preprocess_bytes(b"hello", 224),
            Err(AppError::Inference(_))
        ));
    }

    #[test]
    fn normalization_maps_known_pixel_values() {
        let tensor = preprocess_bytes(&png_bytes(300, 300), 224).unwrap();
        let expected_r = (200.0 / 255.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 112, 112]] - expected_r).abs() < 1e-4);
    }
}
