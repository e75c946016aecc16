//! The field-extraction pipeline.
//!
//! One call to [`Extractor::extract`] renders the first page of a PDF, then for
//! each of the three template fields crops the region, cleans it up for
//! handwriting, runs several OCR profiles and normalizes the text. Nothing is
//! kept between calls.
//!
//! Recoverable problems never escape: a missing region or an OCR pass that
//! finds nothing degrades a single field to an empty raw value, and the
//! normalizers turn that into their sentinel. Only a page that cannot be
//! rendered stops the pipeline early.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use image::DynamicImage;
use indicatif::ProgressBar;

use crate::{
    async_utils::spawn_blocking_propagating_panics,
    prelude::*,
    template::{FieldKind, Template},
};

use self::{
    debug_images::DebugImages,
    normalize::{Clock, ERROR, UNKNOWN, UNKNOWN_DATE},
    ocr::{OcrEngine, Recognition, recognize},
    preprocess::PreprocessOptions,
    rasterize::RasterizeOptions,
};

pub mod debug_images;
pub mod normalize;
pub mod ocr;
pub mod preprocess;
pub mod rasterize;
pub mod roi;

/// Boxed error source, so we can carry `anyhow` context inside typed errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong while extracting fields.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The PDF opened fine but has no pages.
    #[error("{} has no pages", .0.display())]
    NoPages(PathBuf),

    /// We could not read the file or run a helper program.
    #[error("cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The file is not a PDF we can render.
    #[error("cannot decode {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// A single field's region is missing, malformed or off the page.
    #[error("invalid region for {field}: {reason}")]
    InvalidRoi { field: FieldKind, reason: String },

    /// The caller asked us to stop.
    #[error("extraction cancelled")]
    Cancelled,

    /// Anything else, such as failing to encode the page preview.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A cancellation flag shared between the caller and a running extraction.
///
/// Checked before rendering and between fields. A single OCR call is never
/// interrupted.
#[derive(Clone, Debug, Default)]
pub struct ExtractCancel(Arc<AtomicBool>);

impl ExtractCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the extraction to stop at the next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return [`ExtractError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), ExtractError> {
        if self.is_cancelled() {
            Err(ExtractError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How did an extraction end?
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// The page was rendered and every field went through OCR. Individual
    /// fields may still hold sentinels.
    Ok,
    /// No template, or the PDF has no pages. All fields are `UNKNOWN`.
    Unreadable,
    /// Something unexpected failed. All fields are `ERROR`.
    Error,
}

/// Raw and normalized values for a single PDF, plus the rendered page.
#[derive(Clone, Debug, Default)]
pub struct ExtractionResult {
    pub order_raw: String,
    pub order_normalized: String,
    pub operator_raw: String,
    pub operator_normalized: String,
    pub date_raw: String,
    pub date_normalized: String,
    /// The rendered first page, when rendering succeeded.
    pub page_image: Option<Arc<DynamicImage>>,
}

impl ExtractionResult {
    /// All fields collapsed to the unreadable sentinels, with no page image.
    pub fn unreadable() -> Self {
        Self {
            order_normalized: UNKNOWN.to_owned(),
            operator_normalized: UNKNOWN.to_owned(),
            date_normalized: UNKNOWN_DATE.to_owned(),
            ..Self::default()
        }
    }

    /// All fields collapsed to the `ERROR` sentinel.
    pub fn failed() -> Self {
        Self {
            order_normalized: ERROR.to_owned(),
            operator_normalized: ERROR.to_owned(),
            date_normalized: ERROR.to_owned(),
            ..Self::default()
        }
    }

    /// The normalized `(order, operator, date)` triple.
    pub fn triple(&self) -> (&str, &str, &str) {
        (
            &self.order_normalized,
            &self.operator_normalized,
            &self.date_normalized,
        )
    }

    /// Encode the rendered page as PNG, if we have one.
    pub fn page_png(&self) -> Result<Option<Vec<u8>>> {
        self.page_image
            .as_deref()
            .map(|image| {
                let mut png = Vec::new();
                image
                    .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
                    .context("failed to encode page image as PNG")?;
                Ok(png)
            })
            .transpose()
    }
}

/// Per-field details which are useful when reviewing an extraction.
#[derive(Clone, Debug, Default)]
pub struct FieldReport {
    /// The OCR profile whose text was chosen, if any.
    pub ocr_profile: Option<String>,
    /// Why this field could not be read, if it could not.
    pub error: Option<String>,
}

/// The full outcome of one extraction.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub status: ExtractionStatus,
    pub result: ExtractionResult,
    /// The template snapshot used for this extraction.
    pub template: Option<Template>,
    /// Details for the order, operator and date fields, in that order.
    pub fields: [FieldReport; 3],
    /// Pipeline-level errors, if any.
    pub errors: Vec<String>,
}

impl Extraction {
    fn collapsed(
        status: ExtractionStatus,
        result: ExtractionResult,
        template: Option<Template>,
        errors: Vec<String>,
    ) -> Self {
        Self {
            status,
            result,
            template,
            fields: Default::default(),
            errors,
        }
    }

    /// Collapse a pipeline failure into sentinel values. Only cancellation
    /// is passed through as an error.
    fn from_error(err: ExtractError, template: &Template) -> Result<Self, ExtractError> {
        match err {
            ExtractError::Cancelled => Err(ExtractError::Cancelled),
            err @ ExtractError::NoPages(_) => {
                warn!("{}", err);
                Ok(Self::collapsed(
                    ExtractionStatus::Unreadable,
                    ExtractionResult::unreadable(),
                    Some(template.clone()),
                    vec![err.to_string()],
                ))
            }
            err => {
                let err = anyhow::Error::from(err);
                error!("extraction failed: {:?}", err);
                Ok(Self::collapsed(
                    ExtractionStatus::Error,
                    ExtractionResult::failed(),
                    Some(template.clone()),
                    vec![format!("{:#}", err)],
                ))
            }
        }
    }
}

/// The text read from one field, before normalization.
struct FieldReading {
    raw: String,
    report: FieldReport,
}

/// Runs the extraction pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Extractor {
    engine: Arc<dyn OcrEngine>,
    rasterize: RasterizeOptions,
    preprocess: PreprocessOptions,
    debug_images: DebugImages,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressBar>,
}

impl Extractor {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        rasterize: RasterizeOptions,
        preprocess: PreprocessOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            rasterize,
            preprocess,
            debug_images: DebugImages::disabled(),
            clock,
            progress: None,
        }
    }

    /// Write diagnostic images to this directory.
    pub fn with_debug_images(mut self, debug_images: DebugImages) -> Self {
        self.debug_images = debug_images;
        self
    }

    /// Report progress on this bar or spinner.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn set_stage(&self, msg: impl Into<std::borrow::Cow<'static, str>>) {
        if let Some(progress) = &self.progress {
            progress.set_message(msg);
        }
    }

    /// Extract the three fields from `pdf_path` using `template`.
    ///
    /// Never fails except on cancellation. Unreadable documents come back as
    /// [`ExtractionStatus::Unreadable`], and unexpected failures as
    /// [`ExtractionStatus::Error`] with the `ERROR` triple.
    #[instrument(level = "debug", skip_all, fields(path = %pdf_path.display()))]
    pub async fn extract(
        &self,
        pdf_path: &Path,
        template: Option<&Template>,
        cancel: &ExtractCancel,
    ) -> Result<Extraction, ExtractError> {
        let Some(template) = template else {
            warn!("no recognition template defined");
            return Ok(Extraction::collapsed(
                ExtractionStatus::Unreadable,
                ExtractionResult::unreadable(),
                None,
                vec!["no recognition template defined".to_owned()],
            ));
        };
        debug!(
            template = %template.name,
            roi_order = ?template.roi_order,
            roi_operator = ?template.roi_operator,
            roi_date = ?template.roi_date,
            "Using recognition template"
        );

        match self.extract_inner(pdf_path, template, cancel).await {
            Ok(extraction) => Ok(extraction),
            Err(err) => Extraction::from_error(err, template),
        }
    }

    async fn extract_inner(
        &self,
        pdf_path: &Path,
        template: &Template,
        cancel: &ExtractCancel,
    ) -> Result<Extraction, ExtractError> {
        cancel.check()?;
        self.set_stage("Rendering first page");
        let page = Arc::new(rasterize::render_first_page(pdf_path, &self.rasterize).await?);
        self.debug_images.save("original_pdf.png", page.clone()).await;

        let mut readings = Vec::with_capacity(FieldKind::ALL.len());
        for field in FieldKind::ALL {
            cancel.check()?;
            self.set_stage(format!("Reading {} field", field));
            readings.push(self.read_field(page.clone(), template, field).await);
        }
        let [order, operator, date]: [FieldReading; 3] = readings
            .try_into()
            .map_err(|_| anyhow!("expected exactly three field readings"))?;

        let result = ExtractionResult {
            order_normalized: normalize::normalize_order(&order.raw),
            operator_normalized: normalize::normalize_operator(&operator.raw),
            date_normalized: normalize::normalize_date(&date.raw, self.clock.as_ref()),
            order_raw: order.raw,
            operator_raw: operator.raw,
            date_raw: date.raw,
            page_image: Some(page),
        };
        info!(
            order = %result.order_normalized,
            order_raw = %result.order_raw,
            operator = %result.operator_normalized,
            operator_raw = %result.operator_raw,
            date = %result.date_normalized,
            date_raw = %result.date_raw,
            "Extracted fields"
        );
        Ok(Extraction {
            status: ExtractionStatus::Ok,
            result,
            template: Some(template.clone()),
            fields: [order.report, operator.report, date.report],
            errors: vec![],
        })
    }

    /// Crop, clean up and OCR one field. Failures only affect this field.
    #[instrument(level = "debug", skip_all, fields(field = %field))]
    async fn read_field(
        &self,
        page: Arc<DynamicImage>,
        template: &Template,
        field: FieldKind,
    ) -> FieldReading {
        let cropped = match roi::crop_field(&page, template, field) {
            Ok(cropped) => cropped,
            Err(err) => {
                warn!("{}", err);
                return FieldReading {
                    raw: String::new(),
                    report: FieldReport {
                        ocr_profile: None,
                        error: Some(err.to_string()),
                    },
                };
            }
        };
        let cropped = Arc::new(cropped);
        self.debug_images
            .save(&format!("roi_{}_original.png", field), cropped.clone())
            .await;

        let options = self.preprocess.clone();
        let processed = {
            let cropped = cropped.clone();
            spawn_blocking_propagating_panics(move || preprocess::enhance(&cropped, &options))
                .await
        };
        let processed = Arc::new(processed);
        self.debug_images
            .save(&format!("roi_{}_processed.png", field), processed.clone())
            .await;

        let Recognition { text, profile } =
            recognize(self.engine.as_ref(), processed, field).await;
        let error = if text.is_empty() {
            Some("no OCR profile recognized any digits".to_owned())
        } else {
            None
        };
        FieldReading {
            raw: text,
            report: FieldReport {
                ocr_profile: profile.map(str::to_owned),
                error,
            },
        }
    }
}
