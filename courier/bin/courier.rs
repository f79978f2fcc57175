#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use clap::Parser;
use courier::{
    cli::{Cli, Command, Format},
    config::{Config, JobSource, find_config_file},
    controller,
};
use courier_common::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            template,
            contacts,
            format,
        } => {
            let jobs = controller::render(&JobSource::Template { template, contacts })?;
            let output = match format {
                Format::Ron => {
                    ron::ser::to_string_pretty(&jobs, ron::ser::PrettyConfig::default())?
                }
                Format::Json => serde_json::to_string_pretty(&jobs)?,
            };
            println!("{output}");
        }
        Command::Send { source, outcomes } => {
            let source = source
                .into_source()
                .ok_or_else(|| anyhow::anyhow!("give --jobs, or --template with --contacts"))?;
            let config = Config::load(&find_config_file(cli.config.as_deref())?)?;
            logging::init();

            let report = controller::send(config, &source).await?;
            let output = if outcomes {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string_pretty(&report.summary)?
            };
            println!("{output}");
        }
        Command::Check => {
            let config = Config::load(&find_config_file(cli.config.as_deref())?)?;
            logging::init();

            let probe = controller::check(&config).await?;
            println!("{}", probe.greeting);
            println!(
                "tls: {}, authenticated: {}",
                if probe.tls { "yes" } else { "no" },
                if probe.authenticated { "yes" } else { "no" }
            );
            for extension in &probe.extensions {
                println!("  {extension}");
            }
        }
    }

    Ok(())
}
