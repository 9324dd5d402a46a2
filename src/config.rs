//! Server configuration: a JSON config file overlaid with `NSBLAST_`-
//! prefixed environment variables, held in a `CowCell` so a config
//! reload swaps in a whole new snapshot instead of mutating fields in
//! place. Adapted from the teacher's `ConfigFile`/`try_from`/`CowCell`
//! pattern; the `flexi_logger`/OAuth2/web-session fields that pattern
//! carried are replaced with this server's own zones/replication/
//! storage knobs.

use crate::error::NsblastError;
use concread::cowcell::{CowCell, CowCellReadTxn};
use config::Config;
use gethostname::gethostname;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;

const CONFIG_LOCATIONS: [&str; 2] = ["./nsblast.json", "~/.config/nsblast.json"];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Used as the SOA MNAME default and in the REST API's status page.
    pub hostname: String,
    pub dns_address: String,
    pub dns_port: u16,
    pub admin_address: String,
    pub admin_port: u16,
    /// Where the RocksDB data directory lives.
    pub storage_path: PathBuf,
    /// Directory `BackupManager` writes hourly checkpoints into.
    pub backup_path: PathBuf,
    pub log_level: String,
    /// QTYPE=ANY minimization policy; see `enums::AnyResponseMode`.
    pub any_response_mode: crate::enums::AnyResponseMode,
    /// Socket address to accept replication followers on, if this
    /// instance acts as a primary.
    pub replication_listen: Option<SocketAddr>,
    pub replication_poll_interval_secs: u64,
    /// Shared secret admin/web clients must present. Overridable by
    /// `NSBLAST_ADMIN_PASSWORD` so it never has to live in the file on
    /// disk.
    #[serde(default)]
    pub admin_password: String,
    /// Shared secret a replication follower or AXFR/IXFR peer presents
    /// to authenticate as part of this cluster. Overridable by
    /// `NSBLAST_CLUSTER_AUTH_KEY`.
    #[serde(default)]
    pub cluster_auth_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            hostname: gethostname().into_string().unwrap_or_else(|_| "localhost".to_string()),
            dns_address: "0.0.0.0".to_string(),
            dns_port: 53,
            admin_address: "127.0.0.1".to_string(),
            admin_port: 8053,
            storage_path: PathBuf::from("./data"),
            backup_path: PathBuf::from("./backups"),
            log_level: "info".to_string(),
            any_response_mode: crate::enums::AnyResponseMode::default(),
            replication_listen: None,
            replication_poll_interval_secs: 2,
            admin_password: String::new(),
            cluster_auth_key: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn dns_listen_addr(&self) -> Result<SocketAddr, NsblastError> {
        format!("{}:{}", self.dns_address, self.dns_port)
            .parse()
            .map_err(|e| NsblastError::Config(format!("invalid dns_address/dns_port: {e}")))
    }

    pub fn admin_listen_addr(&self) -> Result<SocketAddr, NsblastError> {
        format!("{}:{}", self.admin_address, self.admin_port)
            .parse()
            .map_err(|e| NsblastError::Config(format!("invalid admin_address/admin_port: {e}")))
    }

    /// Load from an explicit path, or the first of [`CONFIG_LOCATIONS`]
    /// that exists, then overlay `NSBLAST_`-prefixed environment
    /// variables and the two secret env overrides.
    pub fn load(config_path: Option<&str>) -> Result<ServerConfig, NsblastError> {
        let candidates: Vec<String> = match config_path {
            Some(path) => vec![path.to_string()],
            None => CONFIG_LOCATIONS.iter().map(|s| s.to_string()).collect(),
        };

        let mut config = None;
        for candidate in &candidates {
            let expanded = shellexpand::tilde(candidate).into_owned();
            if std::path::Path::new(&expanded).exists() {
                config = Some(expanded);
                break;
            }
        }

        let mut server_config = match config {
            Some(path) => {
                let builder = Config::builder()
                    .add_source(config::File::new(&path, config::FileFormat::Json))
                    .add_source(config::Environment::with_prefix("nsblast"));
                let built = builder
                    .build()
                    .map_err(|e| NsblastError::Config(format!("failed to load {path}: {e}")))?;
                built
                    .try_deserialize()
                    .map_err(|e| NsblastError::Config(format!("failed to parse {path}: {e}")))?
            }
            None => {
                if config_path.is_some() {
                    return Err(NsblastError::Io(std::io::Error::new(
                        ErrorKind::NotFound,
                        format!("config file not found: {}", candidates.join(", ")),
                    )));
                }
                ServerConfig::default()
            }
        };

        if let Ok(password) = std::env::var("NSBLAST_ADMIN_PASSWORD") {
            server_config.admin_password = password;
        }
        if let Ok(key) = std::env::var("NSBLAST_CLUSTER_AUTH_KEY") {
            server_config.cluster_auth_key = key;
        }

        Ok(server_config)
    }

    pub fn into_cowcell(self) -> CowCell<ServerConfig> {
        CowCell::new(self)
    }
}

/// Validate a loaded config: storage/backup paths must be creatable and
/// listener addresses must parse. Returns every problem found rather
/// than failing on the first, so `nsblast configcheck` can report them
/// all at once.
pub fn check_config(config: &CowCellReadTxn<ServerConfig>) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(e) = config.dns_listen_addr() {
        errors.push(e.to_string());
    }
    if let Err(e) = config.admin_listen_addr() {
        errors.push(e.to_string());
    }
    if config.admin_password.is_empty() {
        errors.push("admin_password is empty; set it in the config file or NSBLAST_ADMIN_PASSWORD".to_string());
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses_listener_addresses() {
        let config = ServerConfig::default();
        assert!(config.dns_listen_addr().is_ok());
        assert!(config.admin_listen_addr().is_ok());
    }

    #[test]
    fn missing_explicit_config_path_errors() {
        let result = ServerConfig::load(Some("/nonexistent/path/nsblast.json"));
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_take_precedence_over_default_secret() {
        // SAFETY: test runs single-threaded within this process; no
        // other test reads NSBLAST_ADMIN_PASSWORD concurrently.
        unsafe {
            std::env::set_var("NSBLAST_ADMIN_PASSWORD", "from-env");
        }
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.admin_password, "from-env");
        unsafe {
            std::env::remove_var("NSBLAST_ADMIN_PASSWORD");
        }
    }

    #[test]
    fn empty_admin_password_is_flagged_by_check_config() {
        let config = ServerConfig::default().into_cowcell();
        let txn = config.read();
        let errors = check_config(&txn);
        assert!(errors.iter().any(|e| e.contains("admin_password")));
    }
}
