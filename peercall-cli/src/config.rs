/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::fs;
use std::path::Path;

use peercall_client::ClientOptions;
use serde::{Deserialize, Serialize};

/// Settings for `peercall demo`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    pub caller: String,
    pub callee: String,
    /// Whether the synthetic screen capture carries system audio.
    pub system_audio: bool,
    /// Longest wait for any one step of the script.
    pub step_timeout_ms: u64,
    pub client: ClientOptions,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            caller: "alice@example.com".to_string(),
            callee: "bob@example.com".to_string(),
            system_audio: false,
            step_timeout_ms: 5_000,
            client: ClientOptions::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: DemoConfig = serde_yaml::from_str(content)?;
        if config.client.signaling_servers.is_empty() {
            anyhow::bail!("at least one signaling server is required");
        }
        Ok(config)
    }

    pub fn from_env_or_default() -> anyhow::Result<Self> {
        // Try to load from config file first
        if let Ok(config_path) = std::env::var("PEERCALL_CONFIG") {
            return Self::from_file(&config_path);
        }

        let defaults = Self::default();
        Ok(Self {
            caller: std::env::var("PEERCALL_CALLER").unwrap_or(defaults.caller),
            callee: std::env::var("PEERCALL_CALLEE").unwrap_or(defaults.callee),
            ..Self::default()
        })
    }
}
