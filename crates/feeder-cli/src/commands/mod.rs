//! Command handler modules for the `feeder` binary.
//!
//! Shared utilities used by multiple command paths live here.

pub mod relay;

use anyhow::{bail, Result};
use feeder_config::{
    report_unused_keys, FeedTable, LoadedConfig, RelayConfig, UnusedKeyPolicy,
};
use feeder_schemas::Pair;
use tracing::{info, warn};

/// Built-in defaults plus `paths`, hashed, unused keys reported.
pub fn load_config(paths: &[String]) -> Result<(LoadedConfig, RelayConfig)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = feeder_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(
            unused_leaf_keys = report.unused_leaf_pointers.len(),
            "CONFIG_UNUSED_KEYS"
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            warn!(unused = %p, "config key not read");
        }
    }

    let cfg = RelayConfig::from_config_json(&loaded.config_json)?;
    info!(
        config_hash = %loaded.config_hash,
        source = %cfg.source.name,
        target = %cfg.target.name,
        pairs = cfg.feeds.len(),
        "config loaded"
    );
    Ok((loaded, cfg))
}

/// Pairs to process: every configured pair, or the requested subset in the
/// requested order. Unconfigured names are rejected up front.
pub fn select_pairs(feeds: &FeedTable, requested: &[String]) -> Result<Vec<Pair>> {
    if requested.is_empty() {
        return Ok(feeds.pairs().cloned().collect());
    }
    let mut out = Vec::with_capacity(requested.len());
    for name in requested {
        let pair = Pair::from(name.trim());
        if feeds.route(&pair).is_none() {
            bail!("UNKNOWN_PAIR: '{}' is not in the feed table", pair);
        }
        if !out.contains(&pair) {
            out.push(pair);
        }
    }
    Ok(out)
}

/// One line per configured pair, in configuration order.
pub fn feed_table_lines(feeds: &FeedTable) -> Vec<String> {
    feeds
        .routes()
        .iter()
        .map(|r| {
            format!(
                "{} source={} target={} eligible={}",
                r.pair,
                or_dash(r.source),
                or_dash(r.target),
                r.is_eligible()
            )
        })
        .collect()
}

fn or_dash(v: Option<impl std::fmt::Display>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}
