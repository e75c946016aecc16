//! The `reports` subcommand: browsing and editing stored reports.

use clap::{Args, Subcommand};

use crate::{
    async_utils::io::write_json,
    prelude::*,
    store::{Report, Store},
};

/// Reports command line arguments.
#[derive(Debug, Args)]
pub struct ReportsOpts {
    #[clap(subcommand)]
    pub cmd: ReportsCmd,
}

/// Ways to work with stored reports.
#[derive(Debug, Subcommand)]
pub enum ReportsCmd {
    /// List all reports, newest first.
    List,
    /// Show one report.
    Show { id: i64 },
    /// Find reports whose order number, operator number or date contains
    /// TEXT.
    Search { text: String },
    /// Find reports by one part of the order number.
    Filter {
        /// Which `-`-separated part of the order number to match (1-4).
        #[clap(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        segment: u8,
        /// Text the segment must contain.
        value: String,
    },
    /// Change a report. Omitted values are left as they are.
    Edit {
        id: i64,
        #[clap(long)]
        order: Option<String>,
        #[clap(long)]
        operator: Option<String>,
        #[clap(long)]
        date: Option<String>,
        /// Path of the source PDF.
        #[clap(long = "pdf")]
        pdf_path: Option<String>,
    },
    /// Delete a report.
    Delete { id: i64 },
    /// Store a report typed in by hand.
    Add {
        #[clap(long)]
        order: String,
        #[clap(long)]
        operator: String,
        #[clap(long)]
        date: String,
        /// Path of the source PDF.
        #[clap(long = "pdf")]
        pdf_path: String,
    },
}

/// The `reports` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_reports(db_path: &Path, opts: &ReportsOpts) -> Result<()> {
    let store = Store::open(db_path)?;
    match &opts.cmd {
        ReportsCmd::List => write_json(None, &store.all_reports()?).await,
        ReportsCmd::Show { id } => write_json(None, &find(&store, *id)?).await,
        ReportsCmd::Search { text } => write_json(None, &store.search_reports(text)?).await,
        ReportsCmd::Filter { segment, value } => {
            let reports = store.filter_by_segment(usize::from(*segment), value)?;
            write_json(None, &reports).await
        }
        ReportsCmd::Edit {
            id,
            order,
            operator,
            date,
            pdf_path,
        } => {
            let current = find(&store, *id)?;
            store.update_report(
                *id,
                order.as_deref().unwrap_or(&current.order_number),
                operator.as_deref().unwrap_or(&current.operator_number),
                date.as_deref().unwrap_or(&current.report_date),
                pdf_path.as_deref(),
            )?;
            write_json(None, &find(&store, *id)?).await
        }
        ReportsCmd::Delete { id } => {
            if !store.delete_report(*id)? {
                return Err(anyhow!("no report with ID {}", id));
            }
            info!(id, "Deleted report");
            Ok(())
        }
        ReportsCmd::Add {
            order,
            operator,
            date,
            pdf_path,
        } => {
            let id = store.insert_report(order, operator, date, pdf_path)?;
            write_json(None, &find(&store, id)?).await
        }
    }
}

/// Load a report which must exist.
fn find(store: &Store, id: i64) -> Result<Report> {
    store
        .report(id)?
        .ok_or_else(|| anyhow!("no report with ID {}", id))
}
