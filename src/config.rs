//! Settings file, client options and demo configuration.

use chrono::Duration;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::account::StorageAccount;
use crate::error::{Error, Result};

/// Development storage account name.
pub const DEFAULT_ACCOUNT: &str = "devstoreaccount1";

/// Development storage account key (base64 encoded).
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Development queue service port.
pub const DEFAULT_QUEUE_PORT: u16 = 10001;

/// Development table service port.
pub const DEFAULT_TABLE_PORT: u16 = 10002;

/// Endpoint suffix used when a connection string does not name one.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Settings file read when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "Settings.json";

/// Largest page the table service returns for a single query.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Visibility timeout applied to received messages unless overridden.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i64 = 30;

/// Contents of the JSON settings file.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "StorageConnectionString")]
    pub storage_connection_string: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("storage_connection_string", &"<redacted>")
            .finish()
    }
}

impl Settings {
    pub fn new(storage_connection_string: impl Into<String>) -> Self {
        Self {
            storage_connection_string: storage_connection_string.into(),
        }
    }

    /// Reads and parses the settings file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!(
                "failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid settings document: {}", e)))
    }

    /// Parses the connection string into a storage account.
    pub fn account(&self) -> Result<StorageAccount> {
        StorageAccount::parse(&self.storage_connection_string)
    }
}

/// Tunables shared by the table and queue clients.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Page size requested from the store when scanning partitions or listing.
    pub max_page_size: u32,
    /// Visibility timeout for received messages.
    pub visibility_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
            visibility_timeout: Duration::seconds(DEFAULT_VISIBILITY_TIMEOUT_SECS),
        }
    }
}

impl ClientOptions {
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    /// Rejects page sizes the store would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(Error::configuration(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.max_page_size
            )));
        }
        if self.visibility_timeout < Duration::seconds(1)
            || self.visibility_timeout > Duration::days(7)
        {
            return Err(Error::configuration(
                "visibility timeout must be between 1 second and 7 days",
            ));
        }
        Ok(())
    }
}

/// Command-line arguments for the demo.
#[derive(Parser, Debug, Clone)]
#[command(name = "storage-demo")]
#[command(about = "Walks through table and queue operations against the in-process store")]
#[command(version)]
pub struct Args {
    /// Path to the JSON settings file.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    /// Queue used by the queue walkthrough.
    #[arg(long, default_value = "queues68f86")]
    pub queue: String,

    /// Table used by the table walkthrough.
    #[arg(long, default_value = "WorkerTable")]
    pub table: String,

    /// Page size for partition scans.
    #[arg(long, default_value_t = MAX_PAGE_SIZE)]
    pub page_size: u32,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,

    /// Do not wait for Enter between steps.
    #[arg(long)]
    pub no_pause: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            settings: PathBuf::from(DEFAULT_SETTINGS_FILE),
            queue: "queues68f86".to_string(),
            table: "WorkerTable".to_string(),
            page_size: MAX_PAGE_SIZE,
            debug: false,
            silent: false,
            no_pause: false,
        }
    }
}

/// Demo configuration derived from command-line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub queue_name: String,
    pub table_name: String,
    pub options: ClientOptions,
    pub debug: bool,
    pub silent: bool,
    pub pause: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config::from(Args::default())
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            settings_path: args.settings,
            queue_name: args.queue,
            table_name: args.table,
            options: ClientOptions::default().with_max_page_size(args.page_size),
            debug: args.debug,
            silent: args.silent,
            pause: !args.no_pause,
        }
    }
}

impl Config {
    /// Log level selected by `--debug` / `--silent`. Debug wins when both are set.
    pub fn log_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.silent {
            Level::ERROR
        } else {
            Level::INFO
        }
    }

    /// Loads the settings file named by this configuration.
    pub fn load_settings(&self) -> Result<Settings> {
        Settings::load(&self.settings_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_json() {
        let settings =
            Settings::from_json(r#"{"StorageConnectionString": "UseDevelopmentStorage=true"}"#)
                .unwrap();
        assert_eq!(settings.storage_connection_string, "UseDevelopmentStorage=true");
    }

    #[test]
    fn test_settings_missing_field() {
        let err = Settings::from_json(r#"{"ConnectionString": "x"}"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_settings_debug_redacts() {
        let settings = Settings::new("AccountKey=secret");
        assert!(!format!("{:?}", settings).contains("secret"));
    }

    #[test]
    fn test_client_options_validate() {
        assert!(ClientOptions::default().validate().is_ok());
        assert!(ClientOptions::default().with_max_page_size(0).validate().is_err());
        assert!(ClientOptions::default().with_max_page_size(1001).validate().is_err());
        assert!(ClientOptions::default()
            .with_visibility_timeout(Duration::zero())
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_from_args() {
        let config = Config::from(Args {
            page_size: 5,
            no_pause: true,
            ..Args::default()
        });
        assert_eq!(config.options.max_page_size, 5);
        assert!(!config.pause);
        assert_eq!(config.settings_path, PathBuf::from(DEFAULT_SETTINGS_FILE));
    }

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(Config::default().log_level(), Level::INFO);
        let silent = Config::from(Args {
            silent: true,
            ..Args::default()
        });
        assert_eq!(silent.log_level(), Level::ERROR);
        let both = Config::from(Args {
            debug: true,
            silent: true,
            ..Args::default()
        });
        assert_eq!(both.log_level(), Level::DEBUG);
    }
}
