// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::Protocol;

/// Top-level runtime configuration: where to load the spec/mapping from, how
/// the ingress pipeline is tuned, and which CAN interfaces to ingest from.
///
/// Loaded once at start-up via [`RuntimeConfig::load_from_file`]; unlike
/// [`crate::spec::Catalogue`] this struct is *not* carried around by value
/// after start-up — its fields seed the individual components, each of
/// which owns its own copy of the knobs it needs.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to the RV-C DGN specification JSON file.
    pub spec_path: PathBuf,
    /// Path to the coach mapping YAML file (or a directory containing
    /// `coach_mapping.<model>.yaml` variants).
    pub coach_mapping_path: PathBuf,
    /// Coach variant selector; overridden by `RVC_COACH_MODEL`.
    #[serde(default)]
    pub coach_model: Option<String>,
    /// CAN backend name; overridden by `CAN_BUSTYPE`. Default `socketcan`.
    #[serde(default = "default_bustype")]
    pub can_bustype: String,
    /// Source address this runtime transmits as.
    #[serde(default = "default_controller_source_address")]
    pub controller_source_address: u8,
    /// Names of CAN interfaces to ingest frames from (e.g. `can0`).
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Discovery engine tuning (C9).
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Priority scheduler tuning (C7).
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Security monitor tuning (C6).
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_bustype() -> String {
    "socketcan".to_string()
}

fn default_controller_source_address() -> u8 {
    0xF9
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "DiscoveryConfig::default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "DiscoveryConfig::default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default = "DiscoveryConfig::default_scan_timeout")]
    pub scan_timeout_secs: u64,
    #[serde(default = "DiscoveryConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "DiscoveryConfig::default_protocols")]
    pub protocols: Vec<Protocol>,
}

impl DiscoveryConfig {
    fn default_polling_interval() -> u64 {
        30
    }

    fn default_discovery_interval() -> u64 {
        300
    }

    fn default_scan_timeout() -> u64 {
        30
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_protocols() -> Vec<Protocol> {
        vec![Protocol::Rvc, Protocol::J1939]
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: Self::default_polling_interval(),
            discovery_interval_secs: Self::default_discovery_interval(),
            scan_timeout_secs: Self::default_scan_timeout(),
            max_retries: Self::default_max_retries(),
            protocols: Self::default_protocols(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "SchedulerConfig::default_max_queue_size")]
    pub max_queue_size: usize,
}

impl SchedulerConfig {
    fn default_max_queue_size() -> usize {
        1000
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: Self::default_max_queue_size(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SecurityConfig {
    #[serde(default = "SecurityConfig::default_window_seconds")]
    pub window_seconds: f64,
}

impl SecurityConfig {
    fn default_window_seconds() -> f64 {
        1.0
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            window_seconds: Self::default_window_seconds(),
        }
    }
}

impl RuntimeConfig {
    /// Loads the configuration from YAML, applies environment overrides,
    /// validates invariants, and returns the ready-to-use value.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: RuntimeConfig =
            serde_yaml::from_str(&s).context("failed to parse runtime config YAML")?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// `RVC_COACH_MODEL` and `CAN_BUSTYPE` take precedence over the file,
    /// mirroring the deployment's environment-variable override convention.
    fn apply_env_overrides(&mut self) {
        if let Ok(model) = env::var("RVC_COACH_MODEL") {
            self.coach_model = Some(model);
        }
        if let Ok(bustype) = env::var("CAN_BUSTYPE") {
            self.can_bustype = bustype;
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.can_bustype.is_empty(),
            "can_bustype must not be empty"
        );
        ensure!(
            self.scheduler.max_queue_size >= 5,
            "scheduler.max_queue_size must be at least 5 (one slot per priority class)"
        );
        ensure!(
            self.security.window_seconds > 0.0,
            "security.window_seconds must be positive"
        );
        ensure!(
            self.discovery.polling_interval_secs > 0,
            "discovery.polling_interval_secs must be positive"
        );
        ensure!(
            self.discovery.discovery_interval_secs > 0,
            "discovery.discovery_interval_secs must be positive"
        );
        Ok(())
    }
}
