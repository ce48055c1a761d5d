//! Runtime tuning plus the on-disk settings the server boots from.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{COMMON_FIELDS, Source};

/// Local settings file, read from the working directory.
pub const LOCAL_SETTINGS_FILE: &str = "local_constants.json";
/// Game field list, read from the data directory.
pub const FIELD_NAMES_FILE: &str = "fields.txt";
/// Hardware address to device label map, read from the data directory.
pub const DEVICE_MAP_FILE: &str = "mac.json";
/// Snapshot file name.
pub const JSON_FILE: &str = "data.json";
/// Export file name.
pub const CSV_FILE: &str = "data.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has no field names")]
    EmptySchema { path: PathBuf },
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Idle time between drain cycles.
    pub poll_interval_ms: u64,
    pub command_queue_bound: usize,
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            command_queue_bound: 64,
            event_capacity: 256,
        }
    }
}

/// Where the snapshot and export live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn snapshot(&self) -> PathBuf {
        self.data_dir.join(JSON_FILE)
    }

    pub fn export(&self) -> PathBuf {
        self.data_dir.join(CSV_FILE)
    }

    pub fn fields(&self) -> PathBuf {
        self.data_dir.join(FIELD_NAMES_FILE)
    }

    pub fn device_map(&self) -> PathBuf {
        self.data_dir.join(DEVICE_MAP_FILE)
    }
}

/// Per-installation settings (`local_constants.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Home team number.
    #[serde(rename = "TEAM")]
    pub team: String,
    /// Event key used for schedule lookup.
    #[serde(rename = "EVENT")]
    pub event: String,
    /// Removable drive directory; empty when none is configured.
    #[serde(rename = "DRIVE", default)]
    pub drive: String,
}

impl LocalSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_text(path)?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn drive_path(&self) -> Option<PathBuf> {
        let drive = self.drive.trim();
        (!drive.is_empty()).then(|| PathBuf::from(drive))
    }
}

/// Game-specific field names, in export order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<String>,
}

impl FieldSchema {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Reads the first line of `fields.txt`: comma-separated snake_case names.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_text(path)?;
        let schema = Self::parse_header(text.lines().next().unwrap_or_default());
        if schema.fields.is_empty() {
            return Err(ConfigError::EmptySchema {
                path: path.to_path_buf(),
            });
        }
        Ok(schema)
    }

    pub fn parse_header(line: &str) -> Self {
        let fields = line
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(camel_case)
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Common fields followed by schema fields, skipping repeats.
    pub fn export_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = COMMON_FIELDS.iter().map(|f| f.to_string()).collect();
        for field in &self.fields {
            if !columns.contains(field) {
                columns.push(field.clone());
            }
        }
        columns
    }
}

/// `AUTO_HIGH_GOALS` -> `autoHighGoals`.
pub fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    for (i, word) in snake.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Resolves device hardware addresses to their labels (`mac.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDirectory {
    labels: BTreeMap<String, String>,
}

impl DeviceDirectory {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_text(path)?;
        let labels: BTreeMap<String, String> =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_labels(labels))
    }

    pub fn from_labels(labels: BTreeMap<String, String>) -> Self {
        let labels = labels
            .into_iter()
            .map(|(addr, label)| (addr.to_ascii_uppercase(), label))
            .collect();
        Self { labels }
    }

    /// Label for `address`, or the address itself when unknown.
    pub fn resolve(&self, address: &str) -> Source {
        self.labels
            .get(&address.to_ascii_uppercase())
            .map(|label| Source::new(label.as_str()))
            .unwrap_or_else(|| Source::new(address))
    }
}
