// SPDX-License-Identifier: MPL-2.0

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    /// increase the verbosity
    ///
    /// This flag can be used multiple times to increase the amount of information
    /// produced by studytracker
    #[arg(global = true, short, long, action = clap::ArgAction::Count, help_heading = "Logging")]
    pub verbose: u8,

    /// output no logging
    ///
    /// Setting quiet disables all logging to stderr.
    #[arg(global = true, long, action = clap::ArgAction::SetTrue, help_heading = "Logging")]
    pub quiet: bool,

    /// configuration file
    ///
    /// Defaults to studytracker/config.toml inside the OS configuration directory.
    #[arg(short, long, env = "STUDYTRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// database file
    ///
    /// Overrides the database_path set in the configuration file.  The file and its
    /// parent directories are created if they don't exist yet.
    #[arg(short, long, env = "STUDYTRACKER_DATABASE")]
    pub database: Option<PathBuf>,

    /// address to serve the web interface on
    ///
    /// Defaults to 127.0.0.1:8501.
    #[arg(short, long, env = "STUDYTRACKER_LISTEN")]
    pub listen: Option<SocketAddr>,
}

impl Arguments {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_path: self.config.clone(),
            database_path: self.database.clone(),
            listen_address: self.listen,
        }
    }
}
