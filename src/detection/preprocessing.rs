use image::{DynamicImage, GenericImageView, imageops::FilterType};

/// Grey used for the letterbox border (114/255, the value YOLO models are trained with).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Geometry of a letterbox transform, needed to map boxes back to the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn new(source_width: u32, source_height: u32, target: u32) -> Self {
        let scale = (target as f32 / source_width as f32).min(target as f32 / source_height as f32);
        let (new_w, new_h) = scaled_size(source_width, source_height, scale);
        Self {
            scale,
            pad_x: ((target - new_w) / 2) as f32,
            pad_y: ((target - new_h) / 2) as f32,
            source_width,
            source_height,
        }
    }

    /// Map an `(x, y)` point from model input space back to source pixels.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.pad_x) / self.scale).clamp(0.0, self.source_width as f32);
        let sy = ((y - self.pad_y) / self.scale).clamp(0.0, self.source_height as f32);
        (sx, sy)
    }
}

fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    (new_w, new_h)
}

/// Resize keeping aspect ratio, pad to a `target` x `target` square and lay
/// the pixels out as normalized NCHW floats.
pub fn letterbox(img: &DynamicImage, target: u32) -> (Vec<f32>, Letterbox) {
    let (width, height) = img.dimensions();
    let geometry = Letterbox::new(width, height, target);
    let (new_w, new_h) = scaled_size(width, height, geometry.scale);

    let resized = img
        .resize_exact(new_w, new_h, FilterType::Triangle)
        .to_rgb8();

    let side = target as usize;
    let plane = side * side;
    let mut data = vec![PAD_VALUE; 3 * plane];
    let (pad_x, pad_y) = (geometry.pad_x as usize, geometry.pad_y as usize);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y as usize + pad_y) * side + (x as usize + pad_x);
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }

    (data, geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn test_letterbox_wide_image_pads_vertically() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(200, 100, Rgb([255u8, 0, 0])));
        let (data, geometry) = letterbox(&img, 64);

        assert_eq!(data.len(), 3 * 64 * 64);
        assert_eq!(geometry.pad_x, 0.0);
        assert_eq!(geometry.pad_y, 16.0);
        // top-left is border, centre is red
        assert!((data[0] - PAD_VALUE).abs() < 1e-6);
        let centre = 32 * 64 + 32;
        assert!((data[centre] - 1.0).abs() < 1e-6);
        assert!(data[64 * 64 + centre].abs() < 1e-6);
    }

    #[test]
    fn test_to_source_inverts_transform() {
        let geometry = Letterbox::new(200, 100, 64);
        let (x, y) = geometry.to_source(32.0, 32.0);
        assert!((x - 100.0).abs() < 0.5);
        assert!((y - 50.0).abs() < 0.5);
    }
}
