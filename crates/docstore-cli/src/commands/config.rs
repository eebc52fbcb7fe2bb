//! Config subcommands.

use std::fmt;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use docstore_core::{DEFAULT_DATABASE, DbUrl};

use crate::cli::GlobalArgs;
use crate::config::{self, Setting};
use crate::output;

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Store the given --url and/or --database in the config file
    Set,

    /// Show the effective connection settings and where they come from
    Show,
}

fn describe<T: fmt::Display>(setting: &Setting<T>) -> String {
    format!("{} ({})", setting.value, setting.source)
}

pub fn handle(cmd: ConfigCommand, globals: &GlobalArgs) -> Result<()> {
    match cmd.command {
        ConfigSubcommand::Set => {
            if globals.url.is_none() && globals.database.is_none() {
                bail!("Nothing to set. Pass --url and/or --database");
            }

            let mut stored = config::load()?;
            if let Some(url) = &globals.url {
                DbUrl::new(url).context("Invalid connection URL")?;
                stored.url = Some(url.clone());
            }
            if let Some(database) = &globals.database {
                stored.database = Some(database.clone());
            }

            let path = config::save(&stored)?;
            output::success(&format!("Saved {}", path.display()));
            Ok(())
        }
        ConfigSubcommand::Show => {
            let settings = config::resolve(globals)?;

            output::field("Config file", &config::config_path()?.display().to_string());

            let url = match &settings.url {
                Some(url) => describe(url),
                None => "(not set)".to_string(),
            };
            output::field("URL", &url);

            let database = match &settings.database {
                Some(database) => describe(database),
                None => {
                    let from_url = settings
                        .url
                        .as_ref()
                        .and_then(|u| docstore_mongo::url_database(&u.value));
                    match from_url {
                        Some(name) => format!("{} (connection URL)", name),
                        None => format!("{} (default)", DEFAULT_DATABASE),
                    }
                }
            };
            output::field("Database", &database);
            Ok(())
        }
    }
}
