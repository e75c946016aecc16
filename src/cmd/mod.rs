//! Command-line entry points.

use std::sync::Arc;

use clap::Args;

use crate::{
    async_utils::io::read_json_or_toml,
    extract::{
        ExtractCancel, ExtractError, Extraction, Extractor,
        debug_images::DebugImages,
        normalize::SystemClock,
        ocr::tesseract::{TesseractOcrEngine, TesseractOptions},
        preprocess::PreprocessOptions,
        rasterize::RasterizeOptions,
    },
    prelude::*,
    store::Store,
    template::{Template, TemplateFile},
    ui::{ProgressConfig, Ui},
};

pub mod extract;
pub mod import;
pub mod reports;
pub mod schema;
pub mod template;

/// Options for commands which run the extraction pipeline.
#[derive(Args, Clone, Debug)]
pub struct ExtractOpts {
    /// Use the template in this TOML or JSON file instead of the stored one.
    #[clap(long = "template", value_name = "FILE")]
    pub template_path: Option<PathBuf>,

    /// Write the rendered page and each field's crops to this directory.
    #[clap(long, env = "REPORT_SCANNER_DEBUG_DIR")]
    pub debug_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub rasterize: RasterizeOptions,

    #[clap(flatten)]
    pub preprocess: PreprocessOptions,

    #[clap(flatten)]
    pub tesseract: TesseractOptions,
}

impl ExtractOpts {
    /// Find the template to extract with: the `--template` file if given,
    /// otherwise whatever is stored in the database.
    pub async fn load_template(&self, db_path: &Path) -> Result<Option<Template>> {
        let template = match &self.template_path {
            Some(path) => {
                let mut template = read_json_or_toml::<TemplateFile>(path).await?;
                template.id = None;
                Some(template)
            }
            None => Store::open(db_path)?.active_template()?,
        };
        if let Some(template) = &template
            && let Err(err) = template.validate()
        {
            // Only the affected fields are skipped.
            warn!("{:#}", err);
        }
        Ok(template)
    }

    fn extractor(&self, ui: &Ui) -> Extractor {
        let engine = Arc::new(TesseractOcrEngine::new(self.tesseract.clone()));
        let mut extractor = Extractor::new(
            engine,
            self.rasterize.clone(),
            self.preprocess.clone(),
            Arc::new(SystemClock),
        )
        .with_progress(ui.new_spinner(&ProgressConfig {
            emoji: "📄",
            msg: "Extracting fields",
            done_msg: "Extracted fields",
        }));
        if let Some(dir) = &self.debug_dir {
            extractor = extractor.with_debug_images(DebugImages::new(dir.clone()));
        }
        extractor
    }

    /// Extract fields from `pdf_path`, stopping early on Ctrl-C.
    pub async fn run(
        &self,
        ui: &Ui,
        db_path: &Path,
        pdf_path: &Path,
    ) -> Result<Extraction> {
        let template = self.load_template(db_path).await?;
        if template.is_none() {
            warn!("no recognition template defined, run `template set` first");
        }

        let cancel = ExtractCancel::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after the current step");
                    cancel.cancel();
                }
            })
        };
        let result = self
            .extractor(ui)
            .extract(pdf_path, template.as_ref(), &cancel)
            .await;
        interrupt.abort();

        match result {
            Ok(extraction) => Ok(extraction),
            Err(err @ ExtractError::Cancelled) => Err(err.into()),
            Err(err) => Err(anyhow::Error::from(err)
                .context(format!("failed to extract {:?}", pdf_path.display()))),
        }
    }
}
