//! Crop and whitening helpers. All boxes are clamped to the image first.

use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::capabilities::{BoxDetection, PixelBox};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Copy out the clamped box, or `None` when nothing remains.
pub fn crop_region(image: &RgbImage, region: PixelBox) -> Option<RgbImage> {
    let b = region.clamp(image.width(), image.height());
    if b.is_empty() {
        return None;
    }
    Some(
        imageops::crop_imm(
            image,
            b.x1 as u32,
            b.y1 as u32,
            b.width() as u32,
            b.height() as u32,
        )
        .to_image(),
    )
}

/// Full-width horizontal band `[y1, y2)`.
pub fn crop_rows(image: &RgbImage, y1: i64, y2: i64) -> Option<RgbImage> {
    crop_region(image, PixelBox::new(0, y1, image.width() as i64, y2))
}

/// Paint the clamped box white. Empty boxes are ignored.
pub fn fill_white(image: &mut RgbImage, region: PixelBox) {
    let b = region.clamp(image.width(), image.height());
    if b.is_empty() {
        return;
    }
    let rect = Rect::at(b.x1 as i32, b.y1 as i32).of_size(b.width() as u32, b.height() as u32);
    draw_filled_rect_mut(image, rect, WHITE);
}

/// Grow a box by a fraction of its own width and height on every side.
pub fn pad_box(b: PixelBox, pad_x: f32, pad_y: f32) -> PixelBox {
    let dx = (b.width() as f32 * pad_x) as i64;
    let dy = (b.height() as f32 * pad_y) as i64;
    PixelBox::new(b.x1 - dx, b.y1 - dy, b.x2 + dx, b.y2 + dy)
}

/// Whiten every detected barcode, padded proportionally to its size.
pub fn erase_regions(image: &mut RgbImage, boxes: &[BoxDetection], pad_x: f32, pad_y: f32) {
    for det in boxes {
        fill_white(image, pad_box(det.bbox.to_pixels(), pad_x, pad_y));
    }
}
