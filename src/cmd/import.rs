//! The `import` subcommand: extract, review, store.

use clap::Args;

use crate::{
    async_utils::io::write_json,
    extract::normalize::is_sentinel,
    prelude::*,
    store::Store,
    ui::Ui,
};

use super::ExtractOpts;

/// Import command line arguments.
#[derive(Debug, Args)]
pub struct ImportOpts {
    /// The PDF to import.
    pub pdf_path: PathBuf,

    #[clap(flatten)]
    pub extract: ExtractOpts,

    /// Use this order number instead of the recognized one.
    #[clap(long)]
    pub order: Option<String>,

    /// Use this operator number instead of the recognized one.
    #[clap(long)]
    pub operator: Option<String>,

    /// Use this date instead of the recognized one.
    #[clap(long)]
    pub date: Option<String>,

    /// Store the report even if some fields could not be read.
    #[clap(long)]
    pub force: bool,

    /// Output file for the stored report. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// Prefer the operator's correction over the recognized value.
fn reviewed(correction: Option<&str>, recognized: &str) -> String {
    correction
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(recognized)
        .to_owned()
}

/// The `import` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.pdf_path.display()))]
pub async fn cmd_import(ui: Ui, db_path: &Path, opts: &ImportOpts) -> Result<()> {
    let extraction = opts.extract.run(&ui, db_path, &opts.pdf_path).await?;
    let (order, operator, date) = extraction.result.triple();

    let order = reviewed(opts.order.as_deref(), order);
    let operator = reviewed(opts.operator.as_deref(), operator);
    let date = reviewed(opts.date.as_deref(), date);

    let unread = [("order", &order), ("operator", &operator), ("date", &date)]
        .into_iter()
        .filter(|(_, value)| is_sentinel(value))
        .map(|(name, value)| format!("{} ({})", name, value))
        .collect::<Vec<_>>();
    if !unread.is_empty() {
        if !opts.force {
            return Err(anyhow!(
                "could not read {} from {:?}; pass corrections such as --order, or --force to store anyway",
                unread.join(", "),
                opts.pdf_path.display(),
            ));
        }
        warn!("storing report with unread fields: {}", unread.join(", "));
    }

    let store = Store::open(db_path)?;
    let id = store.insert_report(
        &order,
        &operator,
        &date,
        &opts.pdf_path.display().to_string(),
    )?;
    let report = store
        .report(id)?
        .ok_or_else(|| anyhow!("report {} vanished after insert", id))?;
    write_json(opts.output_path.as_deref(), &report).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrections_override_recognized_values() {
        assert_eq!(reviewed(Some(" 17 "), "UNKNOWN"), "17");
        assert_eq!(reviewed(Some(""), "018"), "018");
        assert_eq!(reviewed(None, "018"), "018");
    }
}
