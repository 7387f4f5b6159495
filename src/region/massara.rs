//! Decision tree for the Massara and Muasafat templates.

use image::RgbImage;
use tracing::{debug, warn};

use super::crop::crop_rows;
use super::prompts::EXCLUDED_TITLE_MARKERS;
use super::{
    Classification, PageLayout, PageMode, RegionClassifier, RegionDecision, RegionError,
    SkipReason, TemplateFamily,
};

pub(super) async fn classify(
    classifier: &RegionClassifier,
    page: &RgbImage,
    layout: &PageLayout,
) -> Result<Classification, RegionError> {
    let config = classifier.config();
    let title = layout.paragraph_title.or(layout.doc_title);

    match (title, layout.has_table) {
        (None, true) => {
            // Body runs from below the header (or the page top) to above the footer.
            let origin = layout
                .header_image
                .or(layout.header)
                .map(|h| h.y2 + config.crop_offset)
                .unwrap_or(0);
            let Some(mut body) = crop_rows(page, origin, page.height() as i64) else {
                return Ok(Classification::Skip(SkipReason::EmptyCrop));
            };
            classifier.erase_barcodes(&mut body).await?;
            if let Some(footer) = layout.footer {
                let end = (footer.y1 - origin - config.crop_offset).max(0);
                match crop_rows(&body, 0, end) {
                    Some(cut) => body = cut,
                    None => return Ok(Classification::Skip(SkipReason::EmptyCrop)),
                }
            }
            Ok(Classification::Extract(RegionDecision {
                mode: PageMode::Structured(TemplateFamily::MassaraMuasafat),
                image: body,
            }))
        }
        (Some(title), true) => {
            match classifier.probe(page, title).await {
                Ok(text) => {
                    debug!("massara: title probe: {:?}", text);
                    if let Some(marker) = EXCLUDED_TITLE_MARKERS.iter().find(|m| text.contains(**m))
                    {
                        return Ok(Classification::Skip(SkipReason::ExcludedTitle(*marker)));
                    }
                }
                Err(e) => warn!("massara: title probe failed, keeping page: {}", e),
            }
            let mut full = page.clone();
            classifier.erase_barcodes(&mut full).await?;
            Ok(Classification::Extract(RegionDecision {
                mode: PageMode::Medicine,
                image: full,
            }))
        }
        (_, false) => {
            classifier
                .identity_card(page, layout, config.massara_expand_right)
                .await
        }
    }
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

    fn classifier(scripted: Scripted) -> RegionClassifier {
        RegionClassifier::new(Arc::new(scripted).capabilities(), RegionConfig::default())
    }

    #[tokio::test]
    async fn test_table_without_titles_crops_below_header_above_footer() {
        let c = classifier(Scripted::default());
        let layout = vec![
            Detection::new("header", [0.0, 0.0, 600.0, 60.0], 0.9),
            Detection::new("header_image", [0.0, 0.0, 200.0, 100.0], 0.9),
            Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
            Detection::new("footer", [0.0, 900.0, 600.0, 950.0], 0.9),
        ];
        let out = c.classify(&page(), &layout, Template::Massara).await;
        let Classification::Extract(decision) = out else {
            panic!("expected extract, got {:?}", out);
        };
        assert_eq!(
            decision.mode,
            PageMode::Structured(TemplateFamily::MassaraMuasafat)
        );
        // header_image wins: origin 150; footer cut at 900 - 150 - 50 = 700
        assert_eq!(decision.image.dimensions(), (600, 700));
    }

    #[tokio::test]
    async fn test_table_without_header_starts_at_page_top() {
        let c = classifier(Scripted::default());
        let layout = vec![Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9)];
        let out = c.classify(&page(), &layout, Template::Muasafat).await;
        let Classification::Extract(decision) = out else {
            panic!("expected extract");
        };
        assert_eq!(decision.image.dimensions(), (600, 1000));
    }

    #[tokio::test]
    async fn test_medicine_title_marker_skips_page() {
        for marker in ["أدوية ومستلزمات من الايواء", "ورقة خروج", "Discharge Paper"] {
            let c = classifier(Scripted::default().with_probe(Ok(format!("عنوان {}", marker))));
            let layout = vec![
                Detection::new("paragraph_title", [0.0, 0.0, 300.0, 40.0], 0.9),
                Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
            ];
            let out = c.classify(&page(), &layout, Template::Massara).await;
            assert!(
                matches!(out, Classification::Skip(SkipReason::ExcludedTitle(_))),
                "marker {} not excluded",
                marker
            );
        }
    }

    #[tokio::test]
    async fn test_medicine_page_kept_when_probe_fails() {
        let c = classifier(Scripted {
            barcodes: vec![BoxDetection::new([100.0, 100.0, 200.0, 150.0])],
            ..Default::default()
        }
        .with_probe(Err(CapabilityError::EmptyResponse)));
        let layout = vec![
            Detection::new("doc_title", [0.0, 0.0, 300.0, 40.0], 0.9),
            Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
        ];
        let out = c.classify(&page(), &layout, Template::Massara).await;
        let Classification::Extract(decision) = out else {
            panic!("expected medicine page");
        };
        assert_eq!(decision.mode, PageMode::Medicine);
        assert_eq!(decision.image.dimensions(), (600, 1000));
        assert_eq!(decision.image.get_pixel(150, 125), &Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn test_missing_table_falls_back_to_identity_card() {
        let c = classifier(Scripted {
            qr: vec![BoxDetection::new([100.0, 500.0, 150.0, 550.0])],
            ..Default::default()
        });
        let layout = vec![Detection::new("doc_title", [0.0, 0.0, 300.0, 40.0], 0.9)];
        let out = c.classify(&page(), &layout, Template::Massara).await;
        let Classification::Extract(decision) = out else {
            panic!("expected identity card");
        };
        assert_eq!(decision.mode, PageMode::IdentityCard);
        assert_eq!(decision.image.dimensions(), (290, 200));

        let c = classifier(Scripted::default());
        let out = c.classify(&page(), &[], Template::Massara).await;
        assert_eq!(out, Classification::Skip(SkipReason::NoQrCode));
    }
}
