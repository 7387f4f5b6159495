//! Identity-card crop anchored on a QR code.
//!
//! The QR box is the anchor: the card photo and text sit above and to the
//! right of it, so the crop extends `expand_up` QR heights upward and
//! `expand_right` QR widths rightward. Upside-down scans are detected from
//! the QR finder patterns and rotated before cropping.

use image::{imageops, RgbImage};
use tracing::debug;

use super::crop::{crop_region, fill_white};
use super::finder::{determine_orientation, find_finder_patterns, Orientation};
use crate::capabilities::{BoxDetection, PixelBox};

/// Tunables for one identity-card crop.
#[derive(Debug, Clone, Copy)]
pub struct IdCardParams {
    pub expand_up: f32,
    pub expand_right: f32,
    /// Image boxes at or above this share of the crop area are left alone.
    pub whiten_max_ratio: f32,
}

#[derive(Debug, Clone)]
pub struct IdCardCrop {
    pub image: RgbImage,
    pub orientation: Orientation,
}

/// Crop the card region around the first QR detection.
///
/// `image_boxes` are layout `image` regions in original page coordinates.
/// Returns `None` when there is no QR detection or the crop is empty.
pub fn crop_identity_card(
    page: &RgbImage,
    qr_detections: &[BoxDetection],
    image_boxes: &[PixelBox],
    params: IdCardParams,
) -> Option<IdCardCrop> {
    let qr = qr_detections.first()?.bbox.to_pixels();
    let (width, height) = page.dimensions();

    let orientation = crop_region(page, qr)
        .map(|qr_crop| find_finder_patterns(&qr_crop))
        .filter(|centers| centers.len() >= 3)
        .map(|centers| determine_orientation(&centers))
        .unwrap_or(Orientation::Upright);

    let flipped = orientation == Orientation::Flipped;
    let mut working = page.clone();
    if flipped {
        debug!("QR finder patterns indicate a 180 degree scan, rotating page");
        imageops::rotate180_in_place(&mut working);
    }
    let to_working = |b: PixelBox| {
        if flipped {
            b.rotate_180(width, height)
        } else {
            b
        }
    };

    let anchor = to_working(qr);
    let (w, h) = (anchor.width() as f32, anchor.height() as f32);
    let target = PixelBox::new(
        anchor.x1.max(0),
        ((anchor.y2 as f32 - h * params.expand_up) as i64).max(0),
        ((anchor.x1 as f32 + w * params.expand_right) as i64).min(width as i64),
        anchor.y2.min(height as i64),
    );
    let expanded_area = target.signed_area() as f32;

    for b in image_boxes {
        let b = to_working(*b).clamp(width, height);
        if (b.signed_area() as f32) < params.whiten_max_ratio * expanded_area {
            fill_white(&mut working, b);
        }
    }

    let image = crop_region(&working, target)?;
    Some(IdCardCrop { image, orientation })
}
