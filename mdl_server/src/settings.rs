use std::{env, net::IpAddr, path::PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub ip: IpAddr,
    pub port: u16,

    /// Path of the SQLite catalog. Without one the server runs on a
    /// non-persistent in-memory catalog seeded with test data.
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub structured_logging: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Look for a config file that is in the same directory as Cargo.toml if run through cargo,
        // otherwise look in the current working directory.
        let config_path = env::var("CARGO_MANIFEST_DIR").map(PathBuf::from).unwrap_or_default();

        Config::builder()
            .set_default("ip", "0.0.0.0")?
            .set_default("port", 18013)?
            .add_source(File::from(config_path.join("mdl_server.toml")).required(false))
            .add_source(
                Environment::with_prefix("mdl_server")
                    .separator("__")
                    .prefix_separator("_"),
            )
            .build()?
            .try_deserialize()
    }
}
