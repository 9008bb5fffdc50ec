use std::{path::PathBuf, rc::Rc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use tree_state_sync::{
    codec::{Codec, TagStatus},
    scenario::Scenario,
    share::{ShareLinks, ViewMode},
    storage::{FileStore, KeyValueStore},
    StateMap, SyncConfig,
};

#[derive(Parser)]
#[command(name = "tree-state-sync")]
#[command(about = "Encode, inspect and replay tree expansion state")]
struct Cli {
    /// Config file (default: ~/.config/tree-state-sync/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Profile store file, overriding the configured one
    #[arg(long, global = true)]
    local_store: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode collapsed node ids into a token
    Encode { node_ids: Vec<String> },
    /// Decode a token into its state map (JSON)
    Decode { token: String },
    /// Decode a token and check its tag
    Inspect { token: String },
    /// Build a share link for the given collapsed node ids
    Share {
        /// Link to this node instead (anchor link)
        #[arg(long)]
        node: Option<String>,

        #[arg(long, default_value = "daily")]
        view_mode: String,

        /// URL of the report being shared
        #[arg(long, default_value = "https://localhost/index.html")]
        current_url: String,

        node_ids: Vec<String>,
    },
    /// Replay a YAML browsing scenario and print where it ended up
    Simulate { scenario: PathBuf },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => SyncConfig::load_with(Some(path))?,
        None => SyncConfig::load()?,
    };
    if let Some(path) = cli.local_store {
        config.local_store_path = path;
    }
    let codec = Codec::new(config.tag_policy);

    match cli.command {
        Commands::Encode { node_ids } => {
            println!("{}", codec.encode(&StateMap::collapsed(node_ids)));
        }
        Commands::Decode { token } => {
            println!("{}", serde_json::to_string_pretty(&codec.decode(&token))?);
        }
        Commands::Inspect { token } => {
            let report = codec.inspect(&token);
            println!("state: {}", serde_json::to_string(&report.map)?);
            println!(
                "declared tag: {}",
                report.declared_tag.as_deref().unwrap_or("(none)")
            );
            println!("computed tag: {}", report.computed_tag);
            let status = match report.status {
                TagStatus::Missing => "missing (legacy token)".to_string(),
                TagStatus::Match => "match".to_string(),
                TagStatus::Mismatch { declared, computed } => {
                    format!("mismatch (declared {}, computed {})", declared, computed)
                }
                TagStatus::Malformed => "malformed".to_string(),
            };
            println!("tag status: {}", status);
        }
        Commands::Share {
            node,
            view_mode,
            current_url,
            node_ids,
        } => {
            let mode = ViewMode::parse(&view_mode)
                .ok_or_else(|| anyhow::anyhow!("Unknown view mode: {}", view_mode))?;
            let current = Url::parse(&current_url)?;
            let links = ShareLinks::new(config.public_url.clone());
            let token = codec.encode(&StateMap::collapsed(node_ids));
            let link = match node {
                Some(node) => links.anchor_url(&current, &token, &node),
                None => links.share_url(&current, &token, mode),
            };
            println!("{}", link);
        }
        Commands::Simulate { scenario } => {
            let scenario = Scenario::from_file(&scenario)?;
            tracing::info!("Using profile store {:?}", config.local_store_path);
            let local: Rc<dyn KeyValueStore> = Rc::new(FileStore::new(&config.local_store_path));
            let outcome = scenario.run(&config, local)?;
            print!("{}", serde_yaml::to_string(&outcome)?);
        }
    }

    Ok(())
}
