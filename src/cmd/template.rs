//! The `template` subcommand.

use clap::{Args, Subcommand};

use crate::{
    async_utils::io::{read_json_or_toml, write_json},
    prelude::*,
    store::Store,
    template::{Template, TemplateFile},
};

/// Template command line arguments.
#[derive(Debug, Args)]
pub struct TemplateOpts {
    #[clap(subcommand)]
    pub cmd: TemplateCmd,
}

/// Ways to manage the recognition template.
#[derive(Debug, Subcommand)]
pub enum TemplateCmd {
    /// Replace the template. Regions are `x1,y1,x2,y2` in pixels of the
    /// page as rendered at the default resolution.
    Set {
        /// A name for the template.
        #[clap(long)]
        name: String,
        /// Region of the order number.
        #[clap(long, value_name = "REGION")]
        order: Option<String>,
        /// Region of the operator number.
        #[clap(long, value_name = "REGION")]
        operator: Option<String>,
        /// Region of the report date.
        #[clap(long, value_name = "REGION")]
        date: Option<String>,
    },
    /// Replace the template with one from a TOML or JSON file.
    Import {
        /// The template file.
        path: PathBuf,
    },
    /// Print the template.
    Show,
}

/// The `template` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_template(db_path: &Path, opts: &TemplateOpts) -> Result<()> {
    let mut store = Store::open(db_path)?;
    let template = match &opts.cmd {
        TemplateCmd::Set {
            name,
            order,
            operator,
            date,
        } => Template {
            id: None,
            name: name.clone(),
            roi_order: order.clone(),
            roi_operator: operator.clone(),
            roi_date: date.clone(),
        },
        TemplateCmd::Import { path } => {
            let mut template = read_json_or_toml::<TemplateFile>(path).await?;
            template.id = None;
            template
        }
        TemplateCmd::Show => {
            let template = store
                .active_template()?
                .ok_or_else(|| anyhow!("no recognition template defined"))?;
            return write_json(None, &template).await;
        }
    };

    template.validate()?;
    let id = store.save_template(&template)?;
    info!(id, name = %template.name, "Saved recognition template");
    let saved = store
        .active_template()?
        .ok_or_else(|| anyhow!("template {} vanished after saving", id))?;
    write_json(None, &saved).await
}
