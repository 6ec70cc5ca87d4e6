//! Engine configuration.
//!
//! All knobs are defaulted so `MeshConfig::default()` is a working
//! configuration. Hosts with a filesystem can load overrides from a
//! YAML file whose structure mirrors the field paths, e.g.
//!
//! ```yaml
//! initial_hop_count: 4
//! seen:
//!   ttl_ms: 5000
//! link:
//!   send_interval_ms: 50
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Outbound queue sizing (`queue.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum queued outbound messages (`queue.capacity`).
    #[serde(default = "QueueConfig::default_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

impl QueueConfig {
    fn default_capacity() -> usize { 16 }
}

/// Duplicate-suppression set parameters (`seen.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenConfig {
    /// Cap on remembered frames (`seen.max_entries`).
    #[serde(default = "SeenConfig::default_max_entries")]
    pub max_entries: usize,
    /// Cleanup cadence in ms (`seen.cleanup_interval_ms`).
    #[serde(default = "SeenConfig::default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// Entry lifetime in ms (`seen.ttl_ms`). Entries may survive up to
    /// one cleanup interval past their nominal lifetime.
    #[serde(default = "SeenConfig::default_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for SeenConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            cleanup_interval_ms: 1000,
            ttl_ms: 2000,
        }
    }
}

impl SeenConfig {
    fn default_max_entries() -> usize { 10 }
    fn default_cleanup_interval_ms() -> u64 { 1000 }
    fn default_ttl_ms() -> u64 { 2000 }
}

/// End-to-end acknowledgement parameters (`confirm.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// How long to wait for an acknowledgement in ms (`confirm.timeout_ms`).
    #[serde(default = "ConfirmConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

impl ConfirmConfig {
    fn default_timeout_ms() -> u64 { 1000 }
}

/// Routing table parameters (`routing.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Aging cadence in ms (`routing.update_interval_ms`).
    #[serde(default = "RoutingConfig::default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Route lifetime in ms (`routing.ttl_ms`).
    #[serde(default = "RoutingConfig::default_ttl_ms")]
    pub ttl_ms: u64,
    /// Cap on cached routes (`routing.max_entries`).
    #[serde(default = "RoutingConfig::default_max_entries")]
    pub max_entries: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 100,
            ttl_ms: 10_000,
            max_entries: 10,
        }
    }
}

impl RoutingConfig {
    fn default_update_interval_ms() -> u64 { 100 }
    fn default_ttl_ms() -> u64 { 10_000 }
    fn default_max_entries() -> usize { 10 }
}

/// Link adapter parameters (`link.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Link-layer send attempts per frame (`link.max_tries`).
    #[serde(default = "LinkConfig::default_max_tries")]
    pub max_tries: u8,
    /// Minimum spacing between transmissions in ms (`link.send_interval_ms`).
    #[serde(default = "LinkConfig::default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// Cooperative ingress queue depth (`link.ingress_capacity`).
    #[serde(default = "LinkConfig::default_ingress_capacity")]
    pub ingress_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_tries: 2,
            send_interval_ms: 100,
            ingress_capacity: 8,
        }
    }
}

impl LinkConfig {
    fn default_max_tries() -> u8 { 2 }
    fn default_send_interval_ms() -> u64 { 100 }
    fn default_ingress_capacity() -> usize { 8 }
}

/// Root configuration for a mesh device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Network identifier carried in every frame header. Frames whose
    /// header disagrees are dropped on receive (`network_id`).
    #[serde(default)]
    pub network_id: u16,

    /// Forwarding budget stamped on locally originated frames
    /// (`initial_hop_count`).
    #[serde(default = "MeshConfig::default_initial_hop_count")]
    pub initial_hop_count: u8,

    /// Outbound queue sizing (`queue.*`).
    #[serde(default)]
    pub queue: QueueConfig,

    /// Duplicate suppression (`seen.*`).
    #[serde(default)]
    pub seen: SeenConfig,

    /// Acknowledgement timeout (`confirm.*`).
    #[serde(default)]
    pub confirm: ConfirmConfig,

    /// Routing table (`routing.*`).
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Link adapter (`link.*`).
    #[serde(default)]
    pub link: LinkConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            network_id: 0,
            initial_hop_count: 3,
            queue: QueueConfig::default(),
            seen: SeenConfig::default(),
            confirm: ConfirmConfig::default(),
            routing: RoutingConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl MeshConfig {
    fn default_initial_hop_count() -> u8 { 3 }

    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a single YAML file. Missing fields fall
    /// back to their defaults.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
