//! Storage account connection strings.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;
use url::Url;

use crate::config::{
    DEFAULT_ACCOUNT, DEFAULT_ENDPOINT_SUFFIX, DEFAULT_QUEUE_PORT, DEFAULT_TABLE_PORT,
};
use crate::error::{Error, Result};

const INVALID_ACCOUNT: &str = "The supplied storage account information is invalid. \
     Confirm that AccountName and AccountKey in the settings file are valid, \
     then restart the application.";

const KNOWN_SETTINGS: &[&str] = &[
    "defaultendpointsprotocol",
    "accountname",
    "accountkey",
    "endpointsuffix",
    "tableendpoint",
    "queueendpoint",
    "blobendpoint",
    "fileendpoint",
    "usedevelopmentstorage",
];

/// A parsed, validated storage account.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccount {
    name: String,
    table_endpoint: Url,
    queue_endpoint: Url,
    development: bool,
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("table_endpoint", &self.table_endpoint.as_str())
            .field("queue_endpoint", &self.queue_endpoint.as_str())
            .field("development", &self.development)
            .finish()
    }
}

impl StorageAccount {
    /// The local development account.
    pub fn development() -> Self {
        Self {
            name: DEFAULT_ACCOUNT.to_string(),
            table_endpoint: dev_endpoint(DEFAULT_TABLE_PORT),
            queue_endpoint: dev_endpoint(DEFAULT_QUEUE_PORT),
            development: true,
        }
    }

    /// Parses a `Key=Value;Key=Value` connection string.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut settings: HashMap<String, String> = HashMap::new();

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| invalid(format!("malformed setting '{}'", segment)))?;
            let key = key.trim().to_ascii_lowercase();
            if !KNOWN_SETTINGS.contains(&key.as_str()) {
                return Err(invalid(format!("unrecognized setting '{}'", key)));
            }
            if settings.insert(key.clone(), value.trim().to_string()).is_some() {
                return Err(invalid(format!("duplicate setting '{}'", key)));
            }
        }

        if settings.is_empty() {
            return Err(invalid("connection string is empty"));
        }

        if let Some(flag) = settings.get("usedevelopmentstorage") {
            if !flag.eq_ignore_ascii_case("true") {
                return Err(invalid("UseDevelopmentStorage must be 'true'"));
            }
            if settings.len() > 1 {
                return Err(invalid(
                    "UseDevelopmentStorage cannot be combined with other settings",
                ));
            }
            return Ok(Self::development());
        }

        let name = settings
            .get("accountname")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("AccountName is missing"))?
            .clone();
        if !is_valid_account_name(&name) {
            return Err(invalid(format!("AccountName '{}' is not valid", name)));
        }

        let key = settings
            .get("accountkey")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| invalid("AccountKey is missing"))?;
        BASE64
            .decode(key)
            .map_err(|e| invalid(format!("AccountKey is not valid base64: {}", e)))?;

        let protocol = settings
            .get("defaultendpointsprotocol")
            .map(|p| p.to_ascii_lowercase())
            .unwrap_or_else(|| "https".to_string());
        if protocol != "http" && protocol != "https" {
            return Err(invalid(format!(
                "DefaultEndpointsProtocol '{}' is not supported",
                protocol
            )));
        }
        let suffix = settings
            .get("endpointsuffix")
            .map(String::as_str)
            .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);

        let service_endpoint = |explicit: &str, service: &str| -> Result<Url> {
            match settings.get(explicit) {
                Some(endpoint) => parse_endpoint(endpoint),
                None => parse_endpoint(&format!(
                    "{}://{}.{}.{}",
                    protocol, name, service, suffix
                )),
            }
        };

        let table_endpoint = service_endpoint("tableendpoint", "table")?;
        let queue_endpoint = service_endpoint("queueendpoint", "queue")?;
        // Validated for completeness; only tables and queues are served.
        service_endpoint("blobendpoint", "blob")?;
        service_endpoint("fileendpoint", "file")?;

        Ok(Self {
            name,
            table_endpoint,
            queue_endpoint,
            development: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_endpoint(&self) -> &Url {
        &self.table_endpoint
    }

    pub fn queue_endpoint(&self) -> &Url {
        &self.queue_endpoint
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    /// URL of a named table under this account.
    pub fn table_url(&self, table: &str) -> Url {
        resource_url(&self.table_endpoint, table)
    }

    /// URL of a named queue under this account.
    pub fn queue_url(&self, queue: &str) -> Url {
        resource_url(&self.queue_endpoint, queue)
    }
}

impl std::str::FromStr for StorageAccount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(detail: impl AsRef<str>) -> Error {
    Error::configuration(format!("{} ({})", INVALID_ACCOUNT, detail.as_ref()))
}

fn is_valid_account_name(name: &str) -> bool {
    (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| invalid(format!("endpoint '{}' is not a valid URL: {}", endpoint, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() || url.host().is_none()
    {
        return Err(invalid(format!(
            "endpoint '{}' must be an absolute http(s) URL",
            endpoint
        )));
    }
    Ok(url)
}

fn dev_endpoint(port: u16) -> Url {
    Url::parse(&format!("http://127.0.0.1:{}/{}", port, DEFAULT_ACCOUNT))
        .expect("development endpoint is a valid URL")
}

fn resource_url(endpoint: &Url, name: &str) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(name);
    }
    url
}
