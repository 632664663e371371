// SPDX-License-Identifier: MPL-2.0

use std::{
    fs::read_to_string,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};

const APP_NAME: &str = "studytracker";
const DEFAULT_PORT: u16 = 8501;

/// Values given on the command line (or through the environment), which win over the
/// configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub listen_address: Option<SocketAddr>,
}

pub fn load_config(overrides: Overrides) -> Result<Config> {
    let config_toml: PartialConfig = overrides
        .config_path
        .or_else(|| dirs::config_local_dir().map(|dir| dir.join(APP_NAME).join("config.toml")))
        .and_then(|path| read_partial_config(&path))
        .unwrap_or_default();

    let database_path = overrides
        .database_path
        .or(config_toml.database_path)
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join(APP_NAME).join("studytracker.db")))
        .ok_or_else(|| {
            anyhow!("OS data directory could not be determined, use config file to set a database file location")
        })?;
    log::trace!("Config: database_path is {:?}", &database_path);

    let listen_address = overrides
        .listen_address
        .or(config_toml.listen_address)
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)));
    log::trace!("Config: listen_address is {listen_address}");

    Ok(Config {
        database_path,
        listen_address,
    })
}

fn read_partial_config(path: &Path) -> Option<PartialConfig> {
    log::debug!("Reading configuration at path {:?}", path);
    match read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Some(config),
            Err(err) => {
                log::warn!("Could not parse config at path {:?} {err}", path);
                None
            }
        },
        Err(err) => {
            log::trace!("Could not read path {path:?} (assuming no config file set yet) {err}");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    pub listen_address: SocketAddr,
}

#[derive(Default, Debug, PartialEq, serde::Deserialize)]
struct PartialConfig {
    database_path: Option<PathBuf>,
    listen_address: Option<SocketAddr>,
}
