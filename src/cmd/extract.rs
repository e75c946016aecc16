//! The `extract` subcommand.

use clap::Args;
use schemars::JsonSchema;

use crate::{
    async_utils::io::write_json,
    data_url::{PNG_MIME_TYPE, data_url},
    extract::{Extraction, ExtractionStatus, FieldReport},
    prelude::*,
    template::Template,
    ui::Ui,
};

use super::ExtractOpts;

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractCmdOpts {
    /// The PDF to read.
    pub pdf_path: PathBuf,

    #[clap(flatten)]
    pub extract: ExtractOpts,

    /// Write the rendered first page to this PNG file.
    #[clap(long, value_name = "PNG")]
    pub preview: Option<PathBuf>,

    /// Embed the rendered first page in the output as a `data:` URL.
    #[clap(long)]
    pub include_page_image: bool,

    /// Output file. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// One field of an [`ExtractionOutput`].
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct FieldOutput {
    /// Text as recognized.
    pub raw: String,
    /// Normalized value, or a placeholder such as `UNKNOWN`.
    pub normalized: String,
    /// The OCR profile whose text was chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_profile: Option<String>,
    /// Why this field could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FieldOutput {
    fn new(raw: &str, normalized: &str, report: &FieldReport) -> Self {
        Self {
            raw: raw.to_owned(),
            normalized: normalized.to_owned(),
            ocr_profile: report.ocr_profile.clone(),
            error: report.error.clone(),
        }
    }
}

/// The result of extracting fields from one PDF.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct ExtractionOutput {
    /// The PDF we read.
    pub path: PathBuf,
    /// `ok`, `unreadable` (all fields `UNKNOWN`) or `error` (all fields
    /// `ERROR`).
    pub status: ExtractionStatus,
    pub order: FieldOutput,
    pub operator: FieldOutput,
    pub date: FieldOutput,
    /// The template used, if there was one.
    #[serde(default)]
    pub template: Option<Template>,
    /// Problems which affected the whole document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// The rendered first page as a `data:` URL, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_image: Option<String>,
}

impl ExtractionOutput {
    pub fn new(path: &Path, extraction: &Extraction, include_page_image: bool) -> Result<Self> {
        let result = &extraction.result;
        let [order, operator, date] = &extraction.fields;
        let page_image = if include_page_image {
            result
                .page_png()?
                .map(|png| data_url(PNG_MIME_TYPE, &png))
        } else {
            None
        };
        Ok(Self {
            path: path.to_owned(),
            status: extraction.status,
            order: FieldOutput::new(&result.order_raw, &result.order_normalized, order),
            operator: FieldOutput::new(
                &result.operator_raw,
                &result.operator_normalized,
                operator,
            ),
            date: FieldOutput::new(&result.date_raw, &result.date_normalized, date),
            template: extraction.template.clone(),
            errors: extraction.errors.clone(),
            page_image,
        })
    }
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.pdf_path.display()))]
pub async fn cmd_extract(ui: Ui, db_path: &Path, opts: &ExtractCmdOpts) -> Result<()> {
    let extraction = opts.extract.run(&ui, db_path, &opts.pdf_path).await?;

    if let Some(preview) = &opts.preview {
        match extraction.result.page_png()? {
            Some(png) => tokio::fs::write(preview, png)
                .await
                .with_context(|| format!("failed to write {:?}", preview.display()))?,
            None => warn!("no page was rendered, not writing {:?}", preview.display()),
        }
    }

    let output = ExtractionOutput::new(&opts.pdf_path, &extraction, opts.include_page_image)?;
    write_json(opts.output_path.as_deref(), &output).await
}
