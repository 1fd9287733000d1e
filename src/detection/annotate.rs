use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::models::{BoundingBox, Detection};

const PALETTE: [[u8; 3]; 8] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Stable colour per class label.
pub fn color_for(label: &str) -> Rgb<u8> {
    let hash = label
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    Rgb(PALETTE[hash % PALETTE.len()])
}

/// Clamp a box to the canvas. `None` if nothing of it is visible.
fn clamp_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let x0 = bbox.x.max(0.0).floor() as u32;
    let y0 = bbox.y.max(0.0).floor() as u32;
    let x1 = ((bbox.x + bbox.width).ceil().max(0.0) as u32).min(width);
    let y1 = ((bbox.y + bbox.height).ceil().max(0.0) as u32).min(height);

    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0))
}

/// Draw every detection on a copy of `image`. The result keeps the source dimensions.
///
/// Label text needs a font; without one each box gets a plain colour tab.
pub fn annotate(image: &DynamicImage, detections: &[Detection], font: Option<&FontVec>) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();
    let thickness = (width.max(height) / 400).max(1);
    let scale = PxScale::from((height as f32 / 40.0).max(12.0));

    for detection in detections {
        let Some(rect) = clamp_rect(&detection.bbox, width, height) else {
            continue;
        };
        let color = color_for(&detection.class_label);

        for t in 0..thickness {
            let w = rect.width().saturating_sub(2 * t);
            let h = rect.height().saturating_sub(2 * t);
            if w == 0 || h == 0 {
                break;
            }
            let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, inner, color);
        }

        match font {
            Some(font) => {
                let text = format!("{} {:.2}", detection.class_label, detection.confidence);
                let (text_w, text_h) = text_size(scale, font, &text);
                let tab_h = text_h + 4;
                let tab_y = (rect.top() - tab_h as i32).max(0);
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(rect.left(), tab_y).of_size(text_w + 4, tab_h),
                    color,
                );
                draw_text_mut(&mut canvas, TEXT_COLOR, rect.left() + 2, tab_y + 2, scale, font, &text);
            }
            None => {
                let tab = (thickness * 6).min(rect.width()).min(rect.height());
                draw_filled_rect_mut(&mut canvas, Rect::at(rect.left(), rect.top()).of_size(tab, tab), color);
            }
        }
    }

    canvas
}
