//! OCR engine wrapping the `tesseract` CLI tool.

use std::sync::Arc;

use clap::Args;
use image::{DynamicImage, ImageFormat};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    prelude::*,
};

use super::{EngineMode, OcrEngine, OcrProfile, Segmentation};

/// Options for running Tesseract.
#[derive(Args, Clone, Debug)]
pub struct TesseractOptions {
    /// The `tesseract` executable to run.
    #[clap(long = "tesseract", env = "TESSERACT_CMD", default_value = "tesseract")]
    pub command: String,

    /// Tesseract language code. Field content is numeric, so this rarely
    /// matters.
    #[clap(long, default_value = "eng")]
    pub language: String,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            command: "tesseract".to_owned(),
            language: "eng".to_owned(),
        }
    }
}

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractOcrEngine {
    options: TesseractOptions,
}

impl TesseractOcrEngine {
    pub fn new(options: TesseractOptions) -> Self {
        Self { options }
    }
}

/// Command-line flags selecting `profile`.
fn profile_args(profile: &OcrProfile) -> Vec<String> {
    let oem = match profile.engine_mode {
        EngineMode::Legacy => "0",
        EngineMode::Lstm => "1",
    };
    let psm = match profile.segmentation {
        Segmentation::Block => "6",
        Segmentation::SingleLine => "7",
    };
    let mut args = vec![
        "--oem".to_owned(),
        oem.to_owned(),
        "--psm".to_owned(),
        psm.to_owned(),
    ];
    if let Some(whitelist) = profile.whitelist {
        args.push("-c".to_owned());
        args.push(format!("tessedit_char_whitelist={}", whitelist));
    }
    args
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(profile = profile.name))]
    async fn run_profile(
        &self,
        image: Arc<DynamicImage>,
        profile: &OcrProfile,
    ) -> Result<String> {
        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");
        let output_path = tmpdir.path().join("output.txt");
        {
            let input_path = input_path.clone();
            spawn_blocking_propagating_panics(move || {
                image
                    .save_with_format(&input_path, ImageFormat::Png)
                    .context("cannot write tesseract input file")
            })
            .await?;
        }

        // Run tesseract on the input file. It adds `.txt` to the output base.
        let output = Command::new(&self.options.command)
            .arg(&input_path)
            .arg(output_path.with_extension(""))
            .arg("-l")
            .arg(&self.options.language)
            .args(profile_args(profile))
            .output()
            .await
            .with_context(|| format!("cannot run {}", self.options.command))?;
        check_for_command_failure("tesseract", &output, None)?;

        // Read the output file.
        tokio::fs::read_to_string(&output_path)
            .await
            .context("cannot read tesseract output file")
    }
}
