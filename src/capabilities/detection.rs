//! Detection records returned by the layout, QR and barcode detectors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Layout region label produced by the page-layout detector.
///
/// The detector vocabulary is open-ended; labels the classifier does not
/// branch on are kept verbatim in [`LayoutLabel::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LayoutLabel {
    DocTitle,
    Footer,
    ParagraphTitle,
    Header,
    HeaderImage,
    Table,
    Image,
    Other(String),
}

impl LayoutLabel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DocTitle => "doc_title",
            Self::Footer => "footer",
            Self::ParagraphTitle => "paragraph_title",
            Self::Header => "header",
            Self::HeaderImage => "header_image",
            Self::Table => "table",
            Self::Image => "image",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for LayoutLabel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "doc_title" => Self::DocTitle,
            "footer" => Self::Footer,
            "paragraph_title" => Self::ParagraphTitle,
            "header" => Self::Header,
            "header_image" => Self::HeaderImage,
            "table" => Self::Table,
            "image" => Self::Image,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for LayoutLabel {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<LayoutLabel> for String {
    fn from(label: LayoutLabel) -> Self {
        label.as_str().to_string()
    }
}

impl fmt::Display for LayoutLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Floating-point `[x1, y1, x2, y2]` box in page pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncate each coordinate toward zero.
    pub fn to_pixels(&self) -> PixelBox {
        PixelBox::new(
            self.x1 as i64,
            self.y1 as i64,
            self.x2 as i64,
            self.y2 as i64,
        )
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Integer box. Coordinates may fall outside the image until clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl PixelBox {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    /// Signed area; negative when the box is inverted.
    pub fn signed_area(&self) -> i64 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i64, height as i64);
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Map the box into the frame of an image rotated by 180 degrees.
    ///
    /// Applying this twice with the same dimensions yields the original box.
    pub fn rotate_180(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i64, height as i64);
        let (ax, bx) = (w - self.x2, w - self.x1);
        let (ay, by) = (h - self.y2, h - self.y1);
        Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }
}

/// One labeled region from the layout detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: LayoutLabel,
    pub bbox: BBox,
    #[serde(default)]
    pub score: f32,
}

impl Detection {
    pub fn new(label: impl Into<LayoutLabel>, bbox: [f32; 4], score: f32) -> Self {
        Self {
            label: label.into(),
            bbox: bbox.into(),
            score,
        }
    }
}

/// Unlabeled box from the QR or barcode detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxDetection {
    #[serde(rename = "bbox_xyxy")]
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl BoxDetection {
    pub fn new(bbox: [f32; 4]) -> Self {
        Self {
            bbox: bbox.into(),
            confidence: None,
        }
    }
}
