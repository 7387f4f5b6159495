//! Decision tree for the Janzour and Safwa templates.

use image::RgbImage;
use tracing::debug;

use super::crop::crop_rows;
use super::prompts::RECEIPT_MARKERS;
use super::{
    Classification, PageLayout, PageMode, RegionClassifier, RegionDecision, RegionError,
    SkipReason, TemplateFamily,
};

const MODE: PageMode = PageMode::Structured(TemplateFamily::JanzourSafwa);

pub(super) async fn classify(
    classifier: &RegionClassifier,
    page: &RgbImage,
    layout: &PageLayout,
) -> Result<Classification, RegionError> {
    let config = classifier.config();

    // A receipt page has no doc_title; its paragraph title names the receipt.
    let mut receipt = None;
    if layout.doc_title.is_none() {
        if let Some(title) = layout.paragraph_title {
            let text = classifier
                .probe(page, title)
                .await
                .map_err(RegionError::Probe)?;
            debug!("janzour: paragraph title probe: {:?}", text);
            if !RECEIPT_MARKERS.iter().all(|m| text.contains(m)) {
                return Ok(Classification::Skip(SkipReason::NotAReceipt));
            }
            receipt = Some(RegionDecision {
                mode: MODE,
                image: page.clone(),
            });
        }
    }

    let has_header = layout.has_header();
    if !layout.has_table && has_header {
        return classifier
            .identity_card(page, layout, config.janzour_header_expand_right)
            .await;
    }
    if !(has_header && layout.has_table) {
        return classifier
            .identity_card(page, layout, config.janzour_fallback_expand_right)
            .await;
    }

    if let Some(title) = layout.doc_title {
        let Some(mut body) = crop_rows(page, title.y1, page.height() as i64) else {
            return Ok(Classification::Skip(SkipReason::EmptyCrop));
        };
        classifier.erase_barcodes(&mut body).await?;
        if let Some(footer) = layout.footer {
            let end = (footer.y1 - title.y1 - config.crop_offset).max(0);
            match crop_rows(&body, 0, end) {
                Some(cut) => body = cut,
                None => return Ok(Classification::Skip(SkipReason::EmptyCrop)),
            }
        }
        return Ok(Classification::Extract(RegionDecision {
            mode: MODE,
            image: body,
        }));
    }

    Ok(receipt
        .map(Classification::Extract)
        .unwrap_or(Classification::Skip(SkipReason::NoMatchingRegion)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgb, RgbImage};

    use super::super::testing::Scripted;
    use super::super::Template;
    use super::*;
    use crate::capabilities::{BoxDetection, CapabilityError, Detection};
    use crate::config::RegionConfig;

    fn page() -> RgbImage {
        RgbImage::from_pixel(600, 1000, Rgb([120, 120, 120]))
    }

    fn classifier(scripted: Scripted) -> (RegionClassifier, Arc<Scripted>) {
        let scripted = Arc::new(scripted);
        (
            RegionClassifier::new(scripted.clone().capabilities(), RegionConfig::default()),
            scripted,
        )
    }

    fn structured_layout() -> Vec<Detection> {
        vec![
            Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9),
            Detection::new("doc_title", [100.0, 100.0, 500.0, 150.0], 0.9),
            Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
            Detection::new("footer", [0.0, 900.0, 600.0, 950.0], 0.9),
        ]
    }

    #[tokio::test]
    async fn test_doc_title_with_table_crops_between_title_and_footer() {
        let (c, _) = classifier(Scripted {
            barcodes: vec![BoxDetection::new([10.0, 10.0, 60.0, 30.0])],
            ..Default::default()
        });
        let out = c.classify(&page(), &structured_layout(), Template::Janzour).await;
        let Classification::Extract(decision) = out else {
            panic!("expected extract, got {:?}", out);
        };
        assert_eq!(decision.mode, MODE);
        // rows 100..1000, then cut at 900 - 100 - 50 = 750
        assert_eq!(decision.image.dimensions(), (600, 750));
        // barcode whitened in cropped coordinates
        assert_eq!(decision.image.get_pixel(30, 20), &Rgb([255, 255, 255]));
        assert_eq!(decision.image.get_pixel(300, 400), &Rgb([120, 120, 120]));
    }

    #[tokio::test]
    async fn test_non_receipt_paragraph_title_is_skipped() {
        let (c, scripted) = classifier(Scripted::default().with_probe(Ok("تقرير طبي".into())));
        let layout = vec![
            Detection::new("paragraph_title", [0.0, 0.0, 300.0, 40.0], 0.9),
            Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9),
            Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
        ];
        let out = c.classify(&page(), &layout, Template::Safwa).await;
        assert_eq!(out, Classification::Skip(SkipReason::NotAReceipt));
        assert_eq!(*scripted.probe_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_receipt_paragraph_title_uses_full_page() {
        let (c, _) = classifier(Scripted::default().with_probe(Ok("إيصال رقم 1234".into())));
        let layout = vec![
            Detection::new("paragraph_title", [0.0, 0.0, 300.0, 40.0], 0.9),
            Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9),
            Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
        ];
        let out = c.classify(&page(), &layout, Template::Janzour).await;
        assert_eq!(
            out,
            Classification::Extract(RegionDecision {
                mode: MODE,
                image: page()
            })
        );
    }

    #[tokio::test]
    async fn test_probe_error_skips_page() {
        let (c, _) = classifier(
            Scripted::default().with_probe(Err(CapabilityError::Connection("down".into()))),
        );
        let layout = vec![Detection::new("paragraph_title", [0.0, 0.0, 300.0, 40.0], 0.9)];
        let out = c.classify(&page(), &layout, Template::Janzour).await;
        assert!(matches!(out, Classification::Skip(SkipReason::Failed(_))));
    }

    #[tokio::test]
    async fn test_header_without_table_and_no_qr_is_skipped() {
        let (c, _) = classifier(Scripted::default());
        let layout = vec![Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9)];
        let out = c.classify(&page(), &layout, Template::Janzour).await;
        assert_eq!(out, Classification::Skip(SkipReason::NoQrCode));
    }

    #[tokio::test]
    async fn test_bare_page_with_qr_is_identity_card() {
        let (c, _) = classifier(Scripted {
            qr: vec![BoxDetection::new([100.0, 500.0, 150.0, 550.0])],
            ..Default::default()
        });
        let out = c.classify(&page(), &[], Template::Janzour).await;
        let Classification::Extract(decision) = out else {
            panic!("expected identity card");
        };
        assert_eq!(decision.mode, PageMode::IdentityCard);
        // fallback path expands 5.9 widths: 100 + 295 = 395
        assert_eq!(decision.image.dimensions(), (295, 200));
    }

    #[tokio::test]
    async fn test_header_and_table_without_titles_is_skipped() {
        let (c, scripted) = classifier(Scripted::default());
        let layout = vec![
            Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9),
            Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
        ];
        let out = c.classify(&page(), &layout, Template::Janzour).await;
        assert_eq!(out, Classification::Skip(SkipReason::NoMatchingRegion));
        assert_eq!(*scripted.probe_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_classification_is_deterministic() {
        let (c, _) = classifier(Scripted {
            barcodes: vec![BoxDetection::new([10.0, 10.0, 60.0, 30.0])],
            ..Default::default()
        });
        let first = c.classify(&page(), &structured_layout(), Template::Janzour).await;
        let second = c.classify(&page(), &structured_layout(), Template::Janzour).await;
        assert_eq!(first, second);
    }
}
