//! Command line definition for the `courier` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::JobSource;

/// Send HTML email in batches through an SMTP relay
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send HTML email in batches through an SMTP relay", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (RON). Defaults to `COURIER_CONFIG`, then
    /// ./courier.config.ron, then /etc/courier/courier.config.ron
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch a batch and print its summary
    Send {
        #[command(flatten)]
        source: SourceArgs,

        /// Print every per-job outcome, not just the summary
        #[arg(long)]
        outcomes: bool,
    },
    /// Render jobs from a template without sending anything
    Render {
        /// Template file (RON or JSON)
        #[arg(short, long)]
        template: PathBuf,

        /// Contact list (RON or JSON)
        #[arg(short = 'C', long)]
        contacts: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Ron)]
        format: Format,
    },
    /// Connect to the relay and authenticate, without sending
    Check,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = true)]
pub struct SourceArgs {
    /// File of ready-made jobs (RON or JSON)
    #[arg(short, long, conflicts_with_all = ["template", "contacts"])]
    pub jobs: Option<PathBuf>,

    /// Template file, rendered once per contact
    #[arg(short, long, requires = "contacts")]
    pub template: Option<PathBuf>,

    /// Contact list to render the template for
    #[arg(short = 'C', long, requires = "template")]
    pub contacts: Option<PathBuf>,
}

impl SourceArgs {
    /// `None` when neither a job file nor a template/contacts pair was given.
    pub fn into_source(self) -> Option<JobSource> {
        match (self.jobs, self.template, self.contacts) {
            (Some(jobs), _, _) => Some(JobSource::Jobs(jobs)),
            (None, Some(template), Some(contacts)) => {
                Some(JobSource::Template { template, contacts })
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Can be fed back to `send --jobs`
    #[default]
    Ron,
    Json,
}
