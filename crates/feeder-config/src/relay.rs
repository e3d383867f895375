//! Typed view over the merged config document.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::feeds::FeedTable;
use crate::{load_layered_yaml_from_strings, DEFAULT_CONFIG_YAML};

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_CONFIRMATIONS: u64 = 1;
const DEFAULT_SIGNER_KEY_ENV: &str = "PRIVATE_KEY";

/// Connection parameters for one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    /// Expected chain id. `None` skips the check.
    pub chain_id: Option<u64>,
    pub rpc_url: String,
}

/// Deadlines and confirmation depth for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    /// Upper bound for every individual registry read and for the submit call.
    pub call_timeout: Duration,
    /// Upper bound for waiting on inclusion of a submitted write.
    pub confirm_timeout: Duration,
    /// Blocks required on top of the inclusion block.
    pub confirmations: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            confirm_timeout: Duration::from_millis(DEFAULT_CONFIRM_TIMEOUT_MS),
            confirmations: DEFAULT_CONFIRMATIONS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub source: NetworkConfig,
    pub target: NetworkConfig,
    /// Env var NAME holding the signer key.
    pub signer_key_env: String,
    pub settings: RelaySettings,
    pub feeds: FeedTable,
}

impl RelayConfig {
    /// The compiled-in configuration on its own.
    pub fn builtin() -> Result<Self> {
        let loaded = load_layered_yaml_from_strings(&[DEFAULT_CONFIG_YAML])?;
        Self::from_config_json(&loaded.config_json)
    }

    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let source = network_at(config_json, "/source")?;
        let target = network_at(config_json, "/target")?;

        let signer_key_env = read_str_at(config_json, "/signer/key_env")
            .unwrap_or_else(|| DEFAULT_SIGNER_KEY_ENV.to_string());

        let call_ms = read_u64_at(config_json, "/relay/call_timeout_ms")?
            .unwrap_or(DEFAULT_CALL_TIMEOUT_MS);
        let confirm_ms = read_u64_at(config_json, "/relay/confirm_timeout_ms")?
            .unwrap_or(DEFAULT_CONFIRM_TIMEOUT_MS);
        if call_ms == 0 || confirm_ms == 0 {
            bail!("CONFIG_INVALID: relay timeouts must be > 0 ms");
        }
        let confirmations =
            read_u64_at(config_json, "/relay/confirmations")?.unwrap_or(DEFAULT_CONFIRMATIONS);

        let feeds = FeedTable::from_config_json(config_json)?;

        Ok(Self {
            source,
            target,
            signer_key_env,
            settings: RelaySettings {
                call_timeout: Duration::from_millis(call_ms),
                confirm_timeout: Duration::from_millis(confirm_ms),
                confirmations,
            },
            feeds,
        })
    }
}

fn network_at(config_json: &Value, base: &str) -> Result<NetworkConfig> {
    let rpc_url = read_str_at(config_json, &format!("{base}/rpc_url"))
        .with_context(|| format!("CONFIG_INVALID: {base}/rpc_url is required"))?;
    Ok(NetworkConfig {
        name: read_str_at(config_json, &format!("{base}/name"))
            .unwrap_or_else(|| base.trim_start_matches('/').to_string()),
        chain_id: read_u64_at(config_json, &format!("{base}/chain_id"))?,
        rpc_url,
    })
}

/// Non-empty trimmed string at `pointer`, or `None`.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_u64_at(config: &Value, pointer: &str) -> Result<Option<u64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .with_context(|| format!("CONFIG_INVALID: {pointer} must be a non-negative integer")),
    }
}
