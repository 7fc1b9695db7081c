//! Configuration management

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// VOMS authentication configuration
    pub voms: VomsConfig,
    /// Metadata store configuration
    pub metadata: MetadataConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// VOMS authentication configuration.
///
/// All of this is fixed for the process lifetime: the verification flag is
/// read once at startup and never toggled by runtime logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VomsConfig {
    /// VO allow-list file (JSON object keyed by VO name)
    pub policy_file: PathBuf,
    /// Directory with per-VO LSC/certificate files
    pub vomsdir_path: PathBuf,
    /// Directory with trusted CA certificates
    pub ca_path: PathBuf,
    /// Name of the VOMS C API shared library to dlopen
    pub vomsapi_lib: String,
    /// Skip AC signature verification. Local testing only; production
    /// configuration never sets this.
    pub skip_verify: bool,
}

impl Default for VomsConfig {
    fn default() -> Self {
        Self {
            policy_file: PathBuf::from("voms.json"),
            vomsdir_path: PathBuf::from("/etc/grid-security/vomsdir/"),
            ca_path: PathBuf::from("/etc/grid-security/certificates/"),
            vomsapi_lib: "libvomsapi.so.0".to_string(),
            skip_verify: false,
        }
    }
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Maximum accepted document size in bytes
    pub max_document_bytes: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file merged with
    /// `VOMS_METADATA_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("VOMS_METADATA_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }
}
