// SPDX-License-Identifier: MPL-2.0

use std::env;
use std::fmt::Display;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub const APP_NAME: &str = "bluebizhub";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";

pub const PORT_VAR: &str = "BLUEBIZHUB_PORT";
pub const BIND_VAR: &str = "BLUEBIZHUB_BIND";
pub const DB_PATH_VAR: &str = "BLUEBIZHUB_DB_PATH";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("no data directory available; set {DB_PATH_VAR}")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Config {
    /// Read configuration from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = try_load(&lookup, PORT_VAR, DEFAULT_PORT)?;
        let bind = try_load(&lookup, BIND_VAR, IpAddr::from([0, 0, 0, 0]))?;
        let db_path = match lookup(DB_PATH_VAR).filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => {
                let path = default_db_path().ok_or(ConfigError::NoDataDir)?;
                info!("{DB_PATH_VAR} not set, using default: {}", path.display());
                path
            }
        };

        Ok(Self {
            bind,
            port,
            db_path,
        })
    }

    pub fn address(&self) -> String {
        match self.bind {
            IpAddr::V6(ip) => format!("[{ip}]:{}", self.port),
            IpAddr::V4(ip) => format!("{ip}:{}", self.port),
        }
    }
}

/// ~/.local/share/bluebizhub/bluebizhub.db on Linux
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|mut p| {
        p.push(APP_NAME);
        p.push(format!("{APP_NAME}.db"));
        p
    })
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
