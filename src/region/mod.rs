//! Region classification and geometric correction.
//!
//! For each page the classifier picks exactly one [`PageMode`] and produces
//! the sub-image sent for transcription, or skips the page with a reason.
//! Page-level failures never escape: they become [`SkipReason::Failed`].

pub mod crop;
pub mod finder;
pub mod idcard;
mod janzour;
mod massara;
pub mod prompts;

use std::fmt;
use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::capabilities::{
    BarcodeDetector, Capabilities, CapabilityError, Detection, LayoutDetector, LayoutLabel,
    PixelBox, QrDetector, TextExtractor,
};
use crate::config::RegionConfig;
use crop::{crop_region, erase_regions};
use idcard::{crop_identity_card, IdCardParams};
use prompts::{IDCARD_PAGE_PROMPT, JANZOUR_PAGE_PROMPT, MASSARA_PAGE_PROMPT};

/// Document template chosen at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Janzour,
    Safwa,
    Massara,
    #[serde(alias = "musafat")]
    Muasafat,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::Janzour => "janzour",
            Template::Safwa => "safwa",
            Template::Massara => "massara",
            Template::Muasafat => "muasafat",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "janzour" => Some(Template::Janzour),
            "safwa" => Some(Template::Safwa),
            "massara" => Some(Template::Massara),
            "muasafat" | "musafat" => Some(Template::Muasafat),
            _ => None,
        }
    }

    pub fn family(&self) -> TemplateFamily {
        match self {
            Template::Janzour | Template::Safwa => TemplateFamily::JanzourSafwa,
            Template::Massara | Template::Muasafat => TemplateFamily::MassaraMuasafat,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Templates sharing one decision tree and structuring prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFamily {
    JanzourSafwa,
    MassaraMuasafat,
}

pub const PAGE_SEPARATOR: &str = "===========page===========";
pub const IDCARD_SEPARATOR: &str = "============ ID Card ===========";

/// Processing mode chosen for a page. Carries its prompt and separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMode {
    Structured(TemplateFamily),
    IdentityCard,
    Medicine,
}

impl PageMode {
    pub fn keyword(&self) -> &'static str {
        match self {
            PageMode::Structured(TemplateFamily::JanzourSafwa) => "janzour",
            PageMode::Structured(TemplateFamily::MassaraMuasafat) => "massara",
            PageMode::IdentityCard => "idcard",
            PageMode::Medicine => "massara medicine",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            PageMode::Structured(TemplateFamily::JanzourSafwa) => JANZOUR_PAGE_PROMPT,
            PageMode::Structured(TemplateFamily::MassaraMuasafat) | PageMode::Medicine => {
                MASSARA_PAGE_PROMPT
            }
            PageMode::IdentityCard => IDCARD_PAGE_PROMPT,
        }
    }

    /// Line written before the page's text in the joined transcript.
    pub fn separator(&self) -> &'static str {
        match self {
            PageMode::IdentityCard => IDCARD_SEPARATOR,
            _ => PAGE_SEPARATOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionDecision {
    pub mode: PageMode,
    pub image: RgbImage,
}

impl RegionDecision {
    pub fn prompt_keyword(&self) -> &'static str {
        self.mode.keyword()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Paragraph title did not read as a receipt number.
    NotAReceipt,
    /// Title matched a marker for pages that are never extracted.
    ExcludedTitle(&'static str),
    NoQrCode,
    NoMatchingRegion,
    EmptyCrop,
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAReceipt => write!(f, "paragraph title is not a receipt"),
            SkipReason::ExcludedTitle(marker) => write!(f, "excluded title: {}", marker),
            SkipReason::NoQrCode => write!(f, "no QR code on identity-card candidate"),
            SkipReason::NoMatchingRegion => write!(f, "no matching region"),
            SkipReason::EmptyCrop => write!(f, "empty crop"),
            SkipReason::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Extract(RegionDecision),
    Skip(SkipReason),
}

/// Page-level failures, always converted to a skip.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("image load failed: {0}")]
    ImageLoad(String),
    #[error("layout detection failed: {0}")]
    Layout(CapabilityError),
    #[error("QR detection failed: {0}")]
    Qr(CapabilityError),
    #[error("barcode detection failed: {0}")]
    Barcode(CapabilityError),
    #[error("title probe failed: {0}")]
    Probe(CapabilityError),
}

/// First detection of each label the decision trees branch on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub doc_title: Option<PixelBox>,
    pub footer: Option<PixelBox>,
    pub paragraph_title: Option<PixelBox>,
    pub header: Option<PixelBox>,
    pub header_image: Option<PixelBox>,
    pub has_table: bool,
    pub image_boxes: Vec<PixelBox>,
}

impl PageLayout {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut layout = PageLayout::default();
        for det in detections {
            let b = det.bbox.to_pixels();
            let slot = match det.label {
                LayoutLabel::DocTitle => &mut layout.doc_title,
                LayoutLabel::Footer => &mut layout.footer,
                LayoutLabel::ParagraphTitle => &mut layout.paragraph_title,
                LayoutLabel::Header => &mut layout.header,
                LayoutLabel::HeaderImage => &mut layout.header_image,
                LayoutLabel::Table => {
                    layout.has_table = true;
                    continue;
                }
                LayoutLabel::Image => {
                    layout.image_boxes.push(b);
                    continue;
                }
                LayoutLabel::Other(_) => continue,
            };
            if slot.is_none() {
                *slot = Some(b);
            }
        }
        layout
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some() || self.header_image.is_some()
    }
}

/// Region classifier over an injected capability set.
pub struct RegionClassifier {
    caps: Capabilities,
    config: RegionConfig,
}

impl RegionClassifier {
    pub fn new(caps: Capabilities, config: RegionConfig) -> Self {
        Self { caps, config }
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Load a page from disk, run layout detection, then classify.
    pub async fn classify_path(&self, path: &Path, template: Template) -> Classification {
        let page = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                return Classification::Skip(SkipReason::Failed(
                    RegionError::ImageLoad(e.to_string()).to_string(),
                ))
            }
        };
        let detections = match self.caps.layout.detect_layout(&page).await {
            Ok(d) => d,
            Err(e) => {
                return Classification::Skip(SkipReason::Failed(
                    RegionError::Layout(e).to_string(),
                ))
            }
        };
        debug!(
            "{}: {} layout detections",
            path.display(),
            detections.len()
        );
        self.classify(&page, &detections, template).await
    }

    /// Classify one page given its layout detections.
    pub async fn classify(
        &self,
        page: &RgbImage,
        detections: &[Detection],
        template: Template,
    ) -> Classification {
        let layout = PageLayout::from_detections(detections);
        let result = match template.family() {
            TemplateFamily::JanzourSafwa => janzour::classify(self, page, &layout).await,
            TemplateFamily::MassaraMuasafat => massara::classify(self, page, &layout).await,
        };
        result.unwrap_or_else(|e| Classification::Skip(SkipReason::Failed(e.to_string())))
    }

    /// Read a small region with the title probe prompt.
    async fn probe(&self, page: &RgbImage, region: PixelBox) -> Result<String, CapabilityError> {
        let Some(crop) = crop_region(page, region) else {
            return Ok(String::new());
        };
        self.caps
            .extractor
            .extract(&crop, prompts::TITLE_PROBE_PROMPT, self.config.probe_max_tokens)
            .await
    }

    /// Detect barcodes on `image` and whiten them.
    async fn erase_barcodes(&self, image: &mut RgbImage) -> Result<(), RegionError> {
        let barcodes = self
            .caps
            .barcode
            .detect_barcodes(image)
            .await
            .map_err(RegionError::Barcode)?;
        erase_regions(
            image,
            &barcodes,
            self.config.barcode_pad_x,
            self.config.barcode_pad_y,
        );
        Ok(())
    }

    /// Shared identity-card path: QR on the full page, then the anchored crop.
    async fn identity_card(
        &self,
        page: &RgbImage,
        layout: &PageLayout,
        expand_right: f32,
    ) -> Result<Classification, RegionError> {
        let qr = self.caps.qr.detect_qr(page).await.map_err(RegionError::Qr)?;
        if qr.is_empty() {
            return Ok(Classification::Skip(SkipReason::NoQrCode));
        }
        let params = IdCardParams {
            expand_up: self.config.idcard_expand_up,
            expand_right,
            whiten_max_ratio: self.config.image_whiten_max_ratio,
        };
        Ok(
            match crop_identity_card(page, &qr, &layout.image_boxes, params) {
                Some(card) => {
                    debug!(
                        "identity card: {}x{} crop, rotated {} degrees",
                        card.image.width(),
                        card.image.height(),
                        card.orientation.degrees()
                    );
                    Classification::Extract(RegionDecision {
                        mode: PageMode::IdentityCard,
                        image: card.image,
                    })
                }
                None => Classification::Skip(SkipReason::EmptyCrop),
            },
        )
    }
}
