//! Image decoding and tensor preparation for the face models

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;

/// SCRFD detector input (width, height)
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);

/// FER+ emotion classifier input (width, height)
pub const EMOTION_INPUT_SIZE: (u32, u32) = (64, 64);

/// Decode image bytes (JPEG, PNG, ...) and undo EXIF rotation
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data).context("Failed to decode image")?;
    Ok(apply_exif_orientation(data, image))
}

/// Camera apps often store the rotation as an EXIF tag instead of rotating
/// the pixels. Values follow the EXIF Orientation table (1..=8).
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    let orientation = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .ok()
        .and_then(|exif_data| {
            exif_data
                .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1);

    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Mapping between letterboxed detector space and the original image
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl Letterbox {
    pub fn new(original: (u32, u32), target: (u32, u32)) -> Self {
        let (orig_w, orig_h) = original;
        let (target_w, target_h) = target;

        let scale = f32::min(
            target_w as f32 / orig_w.max(1) as f32,
            target_h as f32 / orig_h.max(1) as f32,
        );
        let new_w = ((orig_w as f32 * scale) as u32).clamp(1, target_w);
        let new_h = ((orig_h as f32 * scale) as u32).clamp(1, target_h);

        Self {
            scale,
            offset_x: (target_w - new_w) / 2,
            offset_y: (target_h - new_h) / 2,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.original_width as f32 * self.scale) as u32).max(1),
            ((self.original_height as f32 * self.scale) as u32).max(1),
        )
    }

    /// Map a detector-space point back to original pixels, clamped to bounds
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x as f32) / self.scale;
        let y = (y - self.offset_y as f32) / self.scale;
        (
            x.clamp(0.0, self.original_width as f32),
            y.clamp(0.0, self.original_height as f32),
        )
    }
}

/// Letterbox the frame into the detector input and build a BGR NCHW tensor
/// normalised as `(v - 127.5) / 128`.
pub fn prepare_detector_input(image: &DynamicImage) -> (Array4<f32>, Letterbox) {
    let (target_w, target_h) = DETECTOR_INPUT_SIZE;
    let letterbox = Letterbox::new(image.dimensions(), DETECTOR_INPUT_SIZE);
    let (new_w, new_h) = letterbox.scaled_size();

    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();
    let mut canvas = RgbImage::new(target_w, target_h);
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.offset_x),
        i64::from(letterbox.offset_y),
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        // BGR channel order
        tensor[[0, 0, y, x]] = (pixel[2] as f32 - 127.5) / 128.0;
        tensor[[0, 1, y, x]] = (pixel[1] as f32 - 127.5) / 128.0;
        tensor[[0, 2, y, x]] = (pixel[0] as f32 - 127.5) / 128.0;
    }

    (tensor, letterbox)
}

/// Resize a face crop to the emotion input as a single-channel tensor.
/// FER+ expects raw luma values in [0, 255], no normalisation.
pub fn prepare_emotion_input(face: &DynamicImage) -> Array4<f32> {
    let (target_w, target_h) = EMOTION_INPUT_SIZE;
    let gray = face
        .resize_exact(target_w, target_h, FilterType::Triangle)
        .to_luma8();

    let mut tensor = Array4::<f32>::zeros((1, 1, target_h as usize, target_w as usize));
    for (x, y, pixel) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }
    tensor
}

/// Crop a face box with a relative margin, clamped to the image.
/// Returns `None` when the clamped region is empty.
pub fn crop_face(
    image: &DynamicImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    margin: f32,
) -> Option<DynamicImage> {
    let (img_w, img_h) = image.dimensions();
    let margin_x = (x2 - x1) * margin;
    let margin_y = (y2 - y1) * margin;

    let left = (x1 - margin_x).max(0.0) as u32;
    let top = (y1 - margin_y).max(0.0) as u32;
    let right = ((x2 + margin_x).min(img_w as f32).max(0.0)) as u32;
    let bottom = ((y2 + margin_y).min(img_h as f32).max(0.0)) as u32;

    if right <= left || bottom <= top {
        return None;
    }
    Some(image.crop_imm(left, top, right - left, bottom - top))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let image = DynamicImage::new_rgb8(32, 24);
        let decoded = decode_image(&encode_png(&image)).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_image(b"definitely not an image").is_err());
        assert!(decode_image(&[]).is_err());
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::new((1280, 640), DETECTOR_INPUT_SIZE);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.offset_x, 0);
        assert_eq!(lb.offset_y, 160);

        let (x, y) = lb.to_original(320.0, 320.0);
        assert!((x - 640.0).abs() < 1e-3);
        assert!((y - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_clamps_to_image() {
        let lb = Letterbox::new((100, 100), DETECTOR_INPUT_SIZE);
        assert_eq!(lb.to_original(-50.0, 10_000.0), (0.0, 100.0));
    }

    #[test]
    fn test_detector_input_shape() {
        let image = DynamicImage::new_rgb8(200, 100);
        let (tensor, lb) = prepare_detector_input(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(lb.offset_y, 160);
        // Black pixel after normalisation
        assert!((tensor[[0, 0, 320, 320]] - (-127.5 / 128.0)).abs() < 1e-6);
    }

    #[test]
    fn test_emotion_input_is_raw_luma() {
        let white = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 10, image::Luma([255])));
        let tensor = prepare_emotion_input(&white);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert!((tensor[[0, 0, 32, 32]] - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_crop_face_with_margin() {
        let image = DynamicImage::new_rgb8(100, 100);
        let face = crop_face(&image, 20.0, 20.0, 60.0, 60.0, 0.1).unwrap();
        assert_eq!(face.dimensions(), (48, 48));
    }

    #[test]
    fn test_crop_face_clamped_and_empty() {
        let image = DynamicImage::new_rgb8(50, 50);
        let face = crop_face(&image, 40.0, 40.0, 90.0, 90.0, 0.0).unwrap();
        assert_eq!(face.dimensions(), (10, 10));
        assert!(crop_face(&image, 60.0, 60.0, 80.0, 80.0, 0.0).is_none());
    }
}
