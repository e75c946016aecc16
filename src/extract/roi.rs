//! Cropping template regions out of the rendered page.

use image::{DynamicImage, GenericImageView as _};

use crate::{
    prelude::*,
    template::{FieldKind, Roi, Template},
};

use super::ExtractError;

/// Crop the region for `field` from `page`.
///
/// A missing or malformed region is an [`ExtractError::InvalidRoi`] for this
/// field only.
pub fn crop_field(
    page: &DynamicImage,
    template: &Template,
    field: FieldKind,
) -> Result<DynamicImage, ExtractError> {
    let roi = template
        .roi(field)
        .map_err(|err| ExtractError::InvalidRoi {
            field,
            reason: err.to_string(),
        })?
        .ok_or_else(|| ExtractError::InvalidRoi {
            field,
            reason: "no region defined in template".to_owned(),
        })?;
    crop(page, field, &roi)
}

/// Crop `roi` from `page`, clamping it to the page edges.
///
/// Regions drawn a little past the edge still work. A region with nothing left
/// after clamping is an error.
pub fn crop(
    page: &DynamicImage,
    field: FieldKind,
    roi: &Roi,
) -> Result<DynamicImage, ExtractError> {
    let (width, height) = page.dimensions();
    let x2 = roi.x2.min(width);
    let y2 = roi.y2.min(height);
    if roi.x1 >= x2 || roi.y1 >= y2 {
        return Err(ExtractError::InvalidRoi {
            field,
            reason: format!("region {} lies outside the {}x{} page", roi, width, height),
        });
    }
    if (x2, y2) != (roi.x2, roi.y2) {
        debug!(%field, %roi, width, height, "Clamped region to page");
    }
    Ok(page.crop_imm(roi.x1, roi.y1, x2 - roi.x1, y2 - roi.y1))
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    /// A page whose pixel value encodes its row, so we can see where a crop
    /// came from.
    fn page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(100, 50, |_, y| Luma([y as u8])))
    }

    fn template(roi_order: Option<&str>) -> Template {
        Template {
            name: "test".to_owned(),
            roi_order: roi_order.map(str::to_owned),
            ..Template::default()
        }
    }

    #[test]
    fn crops_exact_region() {
        let crop = crop_field(&page(), &template(Some("10,20,40,30")), FieldKind::Order).unwrap();
        assert_eq!(crop.dimensions(), (30, 10));
        assert_eq!(crop.to_luma8().get_pixel(0, 0), &Luma([20]));
        assert_eq!(crop.to_luma8().get_pixel(29, 9), &Luma([29]));
    }

    #[test]
    fn clamps_region_past_the_edge() {
        let crop = crop_field(&page(), &template(Some("90,45,200,80")), FieldKind::Order).unwrap();
        assert_eq!(crop.dimensions(), (10, 5));
    }

    #[test]
    fn region_off_the_page_is_invalid() {
        let err = crop_field(&page(), &template(Some("100,0,150,10")), FieldKind::Order)
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::InvalidRoi {
                field: FieldKind::Order,
                ..
            }
        ));
        assert!(err.to_string().contains("outside the 100x50 page"));
    }

    #[test]
    fn missing_or_malformed_region_is_invalid() {
        assert!(matches!(
            crop_field(&page(), &template(None), FieldKind::Order),
            Err(ExtractError::InvalidRoi { .. })
        ));
        assert!(matches!(
            crop_field(&page(), &template(Some("1,2,3")), FieldKind::Order),
            Err(ExtractError::InvalidRoi { .. })
        ));
        // Other fields are undefined in this template.
        assert!(matches!(
            crop_field(&page(), &template(Some("0,0,10,10")), FieldKind::Date),
            Err(ExtractError::InvalidRoi {
                field: FieldKind::Date,
                ..
            })
        ));
    }
}
