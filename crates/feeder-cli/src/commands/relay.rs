//! `feeder run` and `feeder pair`.
//!
//! Order of operations is fixed: config, then secrets, then network. A missing
//! signer key therefore fails the process before any RPC request is made.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use feeder_config::secrets::{resolve_secrets, RunMode};
use feeder_config::RelayConfig;
use feeder_evm::{EvmSource, EvmTarget, EvmWriter};
use feeder_reconcile::{
    run_batch, PairReport, Reconciler, SchedulePolicy, Shutdown, ShutdownTrigger, WriteMode,
};
use tracing::{info, warn};

use super::{load_config, select_pairs};

pub async fn run_batch_cmd(
    config_paths: &[String],
    requested: &[String],
    dry_run: bool,
    strict: bool,
) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    let pairs = select_pairs(&cfg.feeds, requested)?;
    let reconciler = build_reconciler(&cfg, dry_run).await?;

    let report = run_batch(&reconciler, &pairs, SchedulePolicy::Sequential).await;
    for p in &report.pairs {
        println!("{}", p.line());
    }
    println!("{}", report.summary());

    if strict && !report.is_clean() {
        bail!("BATCH_FAILED: {} pair(s) failed", report.failed());
    }
    Ok(())
}

pub async fn run_pair_cmd(config_paths: &[String], pair: &str, dry_run: bool) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    let pair = select_pairs(&cfg.feeds, &[pair.to_string()])?
        .into_iter()
        .next()
        .context("no pair selected")?;
    let reconciler = build_reconciler(&cfg, dry_run).await?;

    let result = reconciler.reconcile_pair(&pair).await;
    let report = PairReport {
        pair: pair.clone(),
        result,
    };
    println!("{}", report.line());

    match report.result {
        Err(e) if !e.is_benign() => {
            Err(e).with_context(|| format!("RELAY_FAILED pair={pair}"))
        }
        _ => Ok(()),
    }
}

async fn build_reconciler(cfg: &RelayConfig, dry_run: bool) -> Result<Reconciler> {
    let mode = if dry_run {
        RunMode::DryRun
    } else {
        RunMode::Relay
    };
    let secrets = resolve_secrets(&cfg.signer_key_env, mode)?;

    let feeds = Arc::new(cfg.feeds.clone());
    let source = EvmSource::connect(&cfg.source, feeds.clone())?;
    let target = EvmTarget::connect(&cfg.target, feeds.clone())?;
    source.verify_chain_id().await?;
    target.verify_chain_id().await?;

    let writes = match (mode, secrets.signer_key.as_deref()) {
        (RunMode::Relay, Some(key)) => {
            let writer =
                EvmWriter::connect(&cfg.target, feeds.clone(), key, cfg.settings.confirmations)?;
            info!(sender = %writer.sender(), "relaying as");
            WriteMode::Submit(Arc::new(writer))
        }
        (RunMode::Relay, None) => bail!(
            "SECRETS_MISSING mode={}: signer key unavailable",
            mode.as_str()
        ),
        (RunMode::DryRun, _) => WriteMode::DryRun,
    };

    let (trigger, shutdown) = Shutdown::channel();
    spawn_ctrl_c(trigger);

    Ok(Reconciler::new(
        feeds,
        Arc::new(source),
        Arc::new(target),
        writes,
        cfg.settings,
    )
    .with_shutdown(shutdown))
}

fn spawn_ctrl_c(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received; stopping after the current step");
            trigger.trigger();
        }
    });
}
