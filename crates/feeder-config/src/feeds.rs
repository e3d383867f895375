//! Feed address table: Pair -> (source feed address, target aggregator address).
//!
//! The table is an injectable value rather than a set of constants so the
//! engine, the RPC adapters and the test registries all resolve pairs through
//! the same object.
//!
//! A pair with a source address but no target address is valid: it means the
//! aggregator has not been deployed yet and the pair is not eligible for relay.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use feeder_schemas::Pair;
use serde_json::Value;

/// Addresses configured for one pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedRoute {
    pub pair: Pair,
    pub source: Option<Address>,
    pub target: Option<Address>,
}

impl FeedRoute {
    pub fn new(pair: impl Into<Pair>, source: Option<Address>, target: Option<Address>) -> Self {
        Self {
            pair: pair.into(),
            source,
            target,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.target.is_some()
    }
}

/// Ordered feed table. Iteration order is configuration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedTable {
    routes: Vec<FeedRoute>,
    index: BTreeMap<Pair, usize>,
}

impl FeedTable {
    /// Build a table, rejecting duplicate pairs and pairs with no address at all.
    pub fn new(routes: Vec<FeedRoute>) -> Result<Self> {
        let mut index = BTreeMap::new();
        for (i, r) in routes.iter().enumerate() {
            if r.source.is_none() && r.target.is_none() {
                bail!(
                    "FEED_TABLE_INVALID: pair '{}' has neither a source nor a target address",
                    r.pair
                );
            }
            if index.insert(r.pair.clone(), i).is_some() {
                bail!("FEED_TABLE_INVALID: duplicate pair '{}'", r.pair);
            }
        }
        Ok(Self { routes, index })
    }

    /// Parse the `/feeds` list of a merged config document.
    ///
    /// ```yaml
    /// feeds:
    ///   - pair: ETH-USD
    ///     source: "0x5f4e..."
    ///     target: "0x739d..."   # optional
    /// ```
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let Some(raw) = config_json.pointer("/feeds") else {
            return Self::new(Vec::new());
        };
        let entries = raw
            .as_array()
            .context("FEED_TABLE_INVALID: /feeds must be a list")?;

        let mut routes = Vec::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            let pair = e
                .get("pair")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .with_context(|| format!("FEED_TABLE_INVALID: /feeds/{i}/pair missing or empty"))?;
            let source = parse_address(e, "source", i)?;
            let target = parse_address(e, "target", i)?;
            routes.push(FeedRoute::new(pair, source, target));
        }
        Self::new(routes)
    }

    pub fn route(&self, pair: &Pair) -> Option<&FeedRoute> {
        self.index.get(pair).map(|&i| &self.routes[i])
    }

    pub fn source_address(&self, pair: &Pair) -> Option<Address> {
        self.route(pair).and_then(|r| r.source)
    }

    pub fn target_address(&self, pair: &Pair) -> Option<Address> {
        self.route(pair).and_then(|r| r.target)
    }

    /// True when the pair has a deployed target aggregator.
    pub fn is_eligible(&self, pair: &Pair) -> bool {
        self.target_address(pair).is_some()
    }

    pub fn routes(&self) -> &[FeedRoute] {
        &self.routes
    }

    /// All configured pairs in configuration order.
    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.routes.iter().map(|r| &r.pair)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn parse_address(entry: &Value, field: &str, i: usize) -> Result<Option<Address>> {
    match entry.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<Address>()
            .map(Some)
            .with_context(|| format!("FEED_TABLE_INVALID: /feeds/{i}/{field} is not an address")),
        Some(_) => bail!("FEED_TABLE_INVALID: /feeds/{i}/{field} must be a string"),
    }
}
