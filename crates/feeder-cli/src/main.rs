use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "feeder")]
#[command(about = "Relay price feed rounds from a source chain to target aggregators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile every configured pair (or the selected ones), one at a time
    Run {
        /// Restrict the batch to these pairs, in the given order
        #[arg(long = "pair")]
        pairs: Vec<String>,

        /// Read both chains and report what would be written; submit nothing
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Exit non-zero if any pair failed
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Extra config layers in merge order, applied over the built-in defaults
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Reconcile exactly one pair; any failure is fatal
    Pair {
        pair: String,

        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Print the feed table and which pairs are eligible for relay
    Pairs {
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order, applied over the built-in defaults
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience. Production injects env vars directly; existing vars win.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run {
            pairs,
            dry_run,
            strict,
            config_paths,
        } => commands::relay::run_batch_cmd(&config_paths, &pairs, dry_run, strict).await,

        Commands::Pair {
            pair,
            dry_run,
            config_paths,
        } => commands::relay::run_pair_cmd(&config_paths, &pair, dry_run).await,

        Commands::Pairs { config_paths } => {
            let (_, cfg) = commands::load_config(&config_paths)?;
            for line in commands::feed_table_lines(&cfg.feeds) {
                println!("{line}");
            }
            Ok(())
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = feeder_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }
    }
}

fn init_tracing() {
    // stdout carries the report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
