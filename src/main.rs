use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod data_url;
mod extract;
mod prelude;
mod store;
mod template;
mod ui;

/// Read order numbers, operator numbers and dates from scanned PDF reports.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - REPORT_SCANNER_DB (optional): The SQLite database to use.
  - REPORT_SCANNER_DEBUG_DIR (optional): Write diagnostic images here.
  - TESSERACT_CMD (optional): The `tesseract` executable to run.
  - RUST_LOG (optional): Logging filter, such as `debug`.

  `pdfinfo` and `pdftocairo` from poppler-utils must be on the PATH.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    /// SQLite database holding reports and the recognition template.
    #[clap(
        long = "db",
        env = "REPORT_SCANNER_DB",
        default_value = "reports.db",
        global = true
    )]
    db_path: PathBuf,

    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Read the fields of one PDF and print them as JSON.
    Extract(cmd::extract::ExtractCmdOpts),
    /// Read one PDF, apply any corrections, and store it as a report.
    Import(cmd::import::ImportOpts),
    /// Manage the recognition template.
    Template(cmd::template::TemplateOpts),
    /// Browse, edit and delete stored reports.
    Reports(cmd::reports::ReportsOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Import(opts) => opts.output_path.is_none(),
            Cmd::Template(_) | Cmd::Reports(_) => true,
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    let db_path = opts.db_path.as_path();
    match &opts.subcmd {
        Cmd::Extract(extract_opts) => {
            cmd::extract::cmd_extract(ui, db_path, extract_opts).await?;
        }
        Cmd::Import(import_opts) => {
            cmd::import::cmd_import(ui, db_path, import_opts).await?;
        }
        Cmd::Template(template_opts) => {
            cmd::template::cmd_template(db_path, template_opts).await?;
        }
        Cmd::Reports(reports_opts) => {
            cmd::reports::cmd_reports(db_path, reports_opts).await?;
        }
        Cmd::Schema(schema_opts) => {
            cmd::schema::cmd_schema(schema_opts).await?;
        }
    }
    Ok(())
}
