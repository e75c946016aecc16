//! Cleaning up cropped fields so handwriting OCRs well.
//!
//! The output is always a single-channel image with ink at 255 and background
//! at 0. Strokes are thickened slightly, which reconnects broken pen strokes at
//! the cost of fatter digits.

use std::panic::{AssertUnwindSafe, catch_unwind};

use clap::{Args, ValueEnum};
use image::{DynamicImage, GrayImage};
use imageproc::{
    contrast::{adaptive_threshold, otsu_level},
    distance_transform::Norm,
    morphology::{dilate, open},
    region_labelling::{Connectivity, connected_components},
};

use crate::prelude::*;

/// How to separate ink from paper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Binarization {
    /// One global threshold picked from the histogram.
    #[default]
    Otsu,
    /// A threshold per pixel, from the mean of its neighbourhood. Better for
    /// unevenly lit scans.
    Adaptive,
}

/// Options for preprocessing field images.
#[derive(Args, Clone, Debug)]
pub struct PreprocessOptions {
    /// How to binarize field images.
    #[clap(long, value_enum, default_value_t = Binarization::Otsu)]
    pub binarization: Binarization,

    /// Neighbourhood radius for adaptive binarization.
    #[clap(long, default_value = "15")]
    pub adaptive_radius: u32,

    /// Remove ink blobs of at most this many pixels. 0 disables it.
    #[clap(long, default_value = "4")]
    pub max_speck_area: u32,

    /// Radius of an extra morphological opening. This erodes strokes up to
    /// twice the radius wide, so it is off by default.
    #[clap(long, default_value = "0")]
    pub open_radius: u8,

    /// Radius of the dilation used to thicken strokes. 0 disables it.
    #[clap(long, default_value = "1")]
    pub dilate_radius: u8,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            binarization: Binarization::Otsu,
            adaptive_radius: 15,
            max_speck_area: 4,
            open_radius: 0,
            dilate_radius: 1,
        }
    }
}

/// Binarize, despeckle and thicken a cropped field.
///
/// Never fails. If anything goes wrong inside the image operations, we log it
/// and return the input unchanged, because OCR on the raw crop beats no OCR.
/// A panic caught here is still printed by the panic hook.
pub fn enhance(image: &DynamicImage, options: &PreprocessOptions) -> DynamicImage {
    if image.width() == 0 || image.height() == 0 {
        warn!("Empty field image, skipping preprocessing");
        return image.clone();
    }
    let gray = image.to_luma8();
    match catch_unwind(AssertUnwindSafe(|| enhance_gray(&gray, options))) {
        Ok(enhanced) => DynamicImage::ImageLuma8(enhanced),
        Err(_) => {
            warn!(
                width = image.width(),
                height = image.height(),
                "Preprocessing failed, using the unprocessed field image"
            );
            image.clone()
        }
    }
}

fn enhance_gray(gray: &GrayImage, options: &PreprocessOptions) -> GrayImage {
    let binary = match options.binarization {
        Binarization::Otsu => binarize_otsu(gray),
        Binarization::Adaptive => {
            let mut binary = adaptive_threshold(gray, options.adaptive_radius);
            image::imageops::invert(&mut binary);
            binary
        }
    };
    let cleaned = if options.max_speck_area > 0 {
        remove_specks(binary, options.max_speck_area)
    } else {
        binary
    };
    let opened = if options.open_radius > 0 {
        open(&cleaned, Norm::L1, options.open_radius)
    } else {
        cleaned
    };
    if options.dilate_radius > 0 {
        dilate(&opened, Norm::L1, options.dilate_radius)
    } else {
        opened
    }
}

/// Global Otsu threshold, inverted so dark ink becomes 255.
fn binarize_otsu(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    trace!(level, "Otsu threshold");
    let mut binary = gray.clone();
    for pixel in binary.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > level { 0 } else { 255 };
    }
    binary
}

/// Clear 8-connected ink blobs of at most `max_area` pixels. Anything larger
/// is kept untouched, however thin.
fn remove_specks(mut binary: GrayImage, max_area: u32) -> GrayImage {
    let labels = connected_components(&binary, Connectivity::Eight, image::Luma([0u8]));
    let label_count = labels.pixels().map(|label| label.0[0]).max().unwrap_or(0);
    let mut areas = vec![0u32; label_count as usize + 1];
    for label in labels.pixels() {
        areas[label.0[0] as usize] += 1;
    }
    let mut removed = 0u32;
    for (x, y, pixel) in binary.enumerate_pixels_mut() {
        let label = labels.get_pixel(x, y).0[0];
        if label != 0 && areas[label as usize] <= max_area {
            pixel.0[0] = 0;
            removed += 1;
        }
    }
    trace!(removed, "Removed speck pixels");
    binary
}

#[cfg(test)]
mod tests {
    use image::{Luma, Rgb, RgbImage};

    use super::*;

    const INK: Luma<u8> = Luma([255]);
    const PAPER: Luma<u8> = Luma([0]);

    /// White paper with a dark 10x6 stroke at (10, 5) and one stray dark
    /// pixel at (35, 2).
    fn scan() -> DynamicImage {
        let mut img = RgbImage::from_pixel(40, 20, Rgb([250, 250, 245]));
        for y in 5..11 {
            for x in 10..20 {
                img.put_pixel(x, y, Rgb([20, 20, 60]));
            }
        }
        img.put_pixel(35, 2, Rgb([10, 10, 10]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn output_is_single_channel_with_ink_high() {
        let out = enhance(&scan(), &PreprocessOptions::default());
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        let out = out.to_luma8();
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(out.get_pixel(15, 8), &INK);
        assert_eq!(out.get_pixel(2, 18), &PAPER);
    }

    #[test]
    fn isolated_pixels_are_removed() {
        let out = enhance(&scan(), &PreprocessOptions::default()).to_luma8();
        assert_eq!(out.get_pixel(35, 2), &PAPER);
        assert_eq!(out.get_pixel(15, 8), &INK);

        let keep_specks = PreprocessOptions {
            max_speck_area: 0,
            ..PreprocessOptions::default()
        };
        let out = enhance(&scan(), &keep_specks).to_luma8();
        assert_eq!(out.get_pixel(35, 2), &INK);
    }

    #[test]
    fn thin_strokes_survive_despeckling() {
        // A pen stroke only 2 pixels wide.
        let mut img = GrayImage::from_pixel(40, 30, Luma([250]));
        for y in 3..27 {
            for x in 10..12 {
                img.put_pixel(x, y, Luma([30]));
            }
        }
        let out = enhance(&DynamicImage::ImageLuma8(img), &PreprocessOptions::default())
            .to_luma8();
        assert_eq!(out.get_pixel(10, 15), &INK);
        assert_eq!(out.get_pixel(11, 15), &INK);
        let ink = out.pixels().filter(|p| **p == INK).count();
        assert!(ink >= 48, "only {} ink pixels left", ink);
    }

    #[test]
    fn opening_is_opt_in() {
        let options = PreprocessOptions {
            open_radius: 1,
            dilate_radius: 0,
            ..PreprocessOptions::default()
        };
        let out = enhance(&scan(), &options).to_luma8();
        // The 10x6 block survives a radius 1 opening.
        assert_eq!(out.get_pixel(15, 8), &INK);
    }

    #[test]
    fn empty_image_is_returned_unchanged() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let out = enhance(&empty, &PreprocessOptions::default());
        assert_eq!((out.width(), out.height()), (0, 0));
    }

    #[test]
    fn dilation_thickens_strokes() {
        let out = enhance(&scan(), &PreprocessOptions::default()).to_luma8();
        assert_eq!(out.get_pixel(9, 8), &INK);

        let thin = PreprocessOptions {
            dilate_radius: 0,
            ..PreprocessOptions::default()
        };
        let out = enhance(&scan(), &thin).to_luma8();
        assert_eq!(out.get_pixel(9, 8), &PAPER);
        assert_eq!(out.get_pixel(10, 8), &INK);
    }

    #[test]
    fn grayscale_input_is_accepted() {
        let gray = DynamicImage::ImageLuma8(scan().to_luma8());
        let out = enhance(&gray, &PreprocessOptions::default()).to_luma8();
        assert_eq!(out.get_pixel(15, 8), &INK);
    }

    #[test]
    fn adaptive_binarization_marks_ink() {
        let options = PreprocessOptions {
            binarization: Binarization::Adaptive,
            ..PreprocessOptions::default()
        };
        let out = enhance(&scan(), &options).to_luma8();
        assert_eq!(out.get_pixel(15, 8), &INK);
    }
}
