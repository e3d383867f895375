//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only the env var NAME of the signer key
//!   (`signer.key_env`, default `PRIVATE_KEY`).
//! - The binary calls [`resolve_secrets`] once at startup, before any network
//!   activity, and passes the result into constructors.
//! - `Debug` output redacts values; errors mention the env var NAME only.
//!
//! # Mode-aware enforcement
//! - `Relay`:  signer key is **required**.
//! - `DryRun`: nothing is submitted, so the key is optional.

use anyhow::{bail, Result};

/// How the process intends to use the target chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Relay,
    DryRun,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Relay => "RELAY",
            RunMode::DryRun => "DRY_RUN",
        }
    }
}

/// Secrets resolved from the environment for one run.
///
/// Lives for the process lifetime and is never persisted.
/// **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Hex private key for the target-chain writer. `None` if the env var was
    /// absent or empty (only possible in `DryRun`).
    pub signer_key: Option<String>,
    /// The env var the key was read from.
    pub signer_key_env: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("signer_key", &self.signer_key.as_ref().map(|_| "<REDACTED>"))
            .field("signer_key_env", &self.signer_key_env)
            .finish()
    }
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Resolve the signer key named by `key_env` for the given mode.
///
/// # Errors
/// `SECRETS_MISSING` with the env var NAME when `mode == Relay` and the
/// variable is unset or empty.
pub fn resolve_secrets(key_env: &str, mode: RunMode) -> Result<ResolvedSecrets> {
    let signer_key = resolve_env(key_env);

    if mode == RunMode::Relay && signer_key.is_none() {
        bail!(
            "SECRETS_MISSING mode={}: required env var '{}' (signer key) is not set or empty",
            mode.as_str(),
            key_env,
        );
    }

    Ok(ResolvedSecrets {
        signer_key,
        signer_key_env: key_env.to_string(),
    })
}
