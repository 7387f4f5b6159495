//! QR finder-pattern detection and page orientation.
//!
//! A QR code carries three square finder patterns: two along the top edge
//! and one at the bottom-left. Counting centroids above and below the widest
//! vertical gap tells whether the code, and so the page, is upside down.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Contours with a smaller polygon area are noise.
const MIN_PATTERN_AREA: f64 = 100.0;
/// Polygon approximation tolerance as a share of the perimeter.
const APPROX_EPSILON_RATIO: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Upright,
    Flipped,
}

impl Orientation {
    pub fn degrees(&self) -> u16 {
        match self {
            Self::Upright => 0,
            Self::Flipped => 180,
        }
    }
}

/// Centroids of square outer contours in a QR crop.
pub fn find_finder_patterns(qr: &RgbImage) -> Vec<(i64, i64)> {
    if qr.width() == 0 || qr.height() == 0 {
        return Vec::new();
    }
    let binary = binarize_inverted(&imageops::grayscale(qr));

    find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| pattern_center(&c.points))
        .collect()
}

/// Otsu threshold with dark pixels as foreground.
fn binarize_inverted(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        *p = if p[0] > level { Luma([0]) } else { Luma([255]) };
    }
    out
}

fn pattern_center(points: &[Point<i32>]) -> Option<(i64, i64)> {
    if points.len() < 4 {
        return None;
    }
    let epsilon = APPROX_EPSILON_RATIO * arc_length(points, true);
    if approximate_polygon_dp(points, epsilon, true).len() != 4 {
        return None;
    }
    if contour_area(points).abs() <= MIN_PATTERN_AREA {
        return None;
    }

    let (w, h) = bounding_size(points);
    let aspect = w as f64 / h as f64;
    if !(0.8 < aspect && aspect < 1.2) {
        return None;
    }

    polygon_centroid(points).map(|(cx, cy)| (cx as i64, cy as i64))
}

/// Inclusive pixel extent of the contour.
fn bounding_size(points: &[Point<i32>]) -> (i32, i32) {
    let (mut min_x, mut min_y) = (i32::MAX, i32::MAX);
    let (mut max_x, mut max_y) = (i32::MIN, i32::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    (max_x - min_x + 1, max_y - min_y + 1)
}

/// Centroid from first-order polygon moments.
fn polygon_centroid(points: &[Point<i32>]) -> Option<(f64, f64)> {
    let n = points.len();
    let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        let (ax, ay, bx, by) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
        let cross = ax * by - bx * ay;
        m00 += cross;
        m10 += (ax + bx) * cross;
        m01 += (ay + by) * cross;
    }
    if m00 == 0.0 {
        return None;
    }
    // m00 here is twice the area; the moment sums carry a factor of six.
    Some((m10 / (3.0 * m00), m01 / (3.0 * m00)))
}

/// Orientation from finder-pattern centroids.
///
/// Fewer than three centroids means no correction.
pub fn determine_orientation(centers: &[(i64, i64)]) -> Orientation {
    if centers.len() < 3 {
        return Orientation::Upright;
    }
    let mut ys: Vec<i64> = centers.iter().map(|c| c.1).collect();
    ys.sort_unstable();

    let mut max_gap = 0;
    let mut split = 0;
    for i in 0..ys.len() - 1 {
        let gap = ys[i + 1] - ys[i];
        if gap > max_gap {
            max_gap = gap;
            split = i;
        }
    }

    let top = split + 1;
    let bottom = ys.len() - top;
    if top > bottom {
        Orientation::Upright
    } else {
        Orientation::Flipped
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic QR codes drawn from solid squares.

    use image::{Rgb, RgbImage};

    const MODULE: u32 = 6;

    fn fill(img: &mut RgbImage, x: u32, y: u32, size: u32, color: Rgb<u8>) {
        for yy in y..y + size {
            for xx in x..x + size {
                img.put_pixel(xx, yy, color);
            }
        }
    }

    fn finder(img: &mut RgbImage, x: u32, y: u32) {
        fill(img, x, y, 7 * MODULE, Rgb([0, 0, 0]));
        fill(img, x + MODULE, y + MODULE, 5 * MODULE, Rgb([255, 255, 255]));
        fill(img, x + 2 * MODULE, y + 2 * MODULE, 3 * MODULE, Rgb([0, 0, 0]));
    }

    /// 200x200 code with three finder patterns in the upright arrangement.
    pub fn synthetic_qr() -> RgbImage {
        let mut img = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        finder(&mut img, 10, 10);
        finder(&mut img, 148, 10);
        finder(&mut img, 10, 148);
        img
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::synthetic_qr;
    use super::*;
    use image::Rgb;

    #[test]
    fn test_orientation_from_gap_split() {
        assert_eq!(
            determine_orientation(&[(0, 10), (50, 12), (0, 100)]),
            Orientation::Upright
        );
        assert_eq!(
            determine_orientation(&[(0, 10), (50, 98), (0, 100)]),
            Orientation::Flipped
        );
        assert_eq!(determine_orientation(&[(0, 10), (0, 100)]), Orientation::Upright);
        assert_eq!(Orientation::Flipped.degrees(), 180);
    }

    #[test]
    fn test_finds_three_patterns_in_upright_qr() {
        let centers = find_finder_patterns(&synthetic_qr());
        assert_eq!(centers.len(), 3, "centers: {:?}", centers);
        assert_eq!(determine_orientation(&centers), Orientation::Upright);
    }

    #[test]
    fn test_rotated_qr_is_flipped() {
        let mut img = synthetic_qr();
        imageops::rotate180_in_place(&mut img);
        let centers = find_finder_patterns(&img);
        assert_eq!(centers.len(), 3, "centers: {:?}", centers);
        assert_eq!(determine_orientation(&centers), Orientation::Flipped);
    }

    #[test]
    fn test_blank_crop_has_no_patterns() {
        let img = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
        assert!(find_finder_patterns(&img).is_empty());
        assert!(find_finder_patterns(&RgbImage::new(0, 0)).is_empty());
    }

    #[test]
    fn test_square_centroid() {
        let square = [
            Point::new(0, 0),
            Point::new(20, 0),
            Point::new(20, 20),
            Point::new(0, 20),
        ];
        let (cx, cy) = polygon_centroid(&square).unwrap();
        assert!((cx - 10.0).abs() < 1e-9 && (cy - 10.0).abs() < 1e-9);
        assert_eq!(pattern_center(&square[..3]), None);
    }
}
