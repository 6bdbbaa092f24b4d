use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use slnview_core::explorer::ExplorerEvent;
use slnview_core::settings::SettingsManager;
use slnview_core::solution::{parse_file, SolutionFinder};

mod client;
mod render;

use crate::client::ExplorerClient;
use crate::render::render_tree;

#[derive(Parser, Debug)]
#[command(name = "slnview")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "slnview - .NET solution explorer for the terminal")]
struct Args {
    /// Workspace roots (for multi-root workspaces)
    #[arg(long, value_delimiter = ',', global = true)]
    workspace_roots: Option<Vec<String>>,

    /// Use a specific settings file instead of ~/.slnview/settings.toml
    #[arg(long, value_name = "PATH", global = true)]
    settings_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the solution tree
    Tree {
        /// Levels to expand below the solution roots
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
    /// List the solution files that would be loaded
    Solutions,
    /// Parse one solution file and print it as JSON
    Parse { file: PathBuf },
    /// Print the tree and reprint it whenever it changes
    Watch {
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
}

fn main() -> Result<()> {
    setup_tracing()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();
    info!(command = ?args.command, "CLI startup");

    let workspace_roots = match args.workspace_roots {
        Some(roots) => roots
            .into_iter()
            .map(canonicalize_workspace_root)
            .collect::<Result<Vec<_>>>()?,
        None => vec![std::env::current_dir().context("Failed to get current directory")?],
    };
    let settings = match args.settings_path {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };

    match args.command {
        Cmd::Tree { depth } => {
            let mut client = ExplorerClient::launch(workspace_roots, settings, false);
            let tree = client.expand(depth).await?;
            client.report_pending();
            print!("{}", render_tree(&tree));
        }
        Cmd::Solutions => {
            let found = SolutionFinder::new(settings.settings())
                .find_solutions(&workspace_roots)
                .await;
            for location in found {
                println!("{}", location.solution_path.display());
            }
        }
        Cmd::Parse { file } => {
            let solution = parse_file(&file)
                .await
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&solution)?);
        }
        Cmd::Watch { depth } => watch(workspace_roots, settings, depth).await?,
    }

    Ok(())
}

async fn watch(roots: Vec<PathBuf>, settings: SettingsManager, depth: usize) -> Result<()> {
    let mut client = ExplorerClient::launch(roots, settings, true);
    loop {
        let tree = client.expand(depth).await?;
        print!("{}", render_tree(&tree));

        // Redraw on the next change; other notifications are only logged
        loop {
            let Some(event) = client.next_notification().await else {
                return Ok(());
            };
            match event {
                ExplorerEvent::TreeChanged { node } => {
                    info!(?node, "Tree changed");
                    println!();
                    break;
                }
                ExplorerEvent::LoadFailures(failures) => {
                    for failure in failures {
                        eprintln!(
                            "warning: could not load {}: {}",
                            failure.solution_path.display(),
                            failure.message
                        );
                    }
                }
                other => info!(?other, "Explorer notification"),
            }
        }
    }
}

fn canonicalize_workspace_root(root: String) -> Result<PathBuf> {
    let path = PathBuf::from(&root);
    path.canonicalize()
        .map_err(|e| anyhow::anyhow!("Failed to canonicalize workspace root {root}: {e:?}"))
}

fn setup_tracing() -> Result<()> {
    use std::fs;
    use tracing_subscriber::fmt;

    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    let trace_dir = home.join(".slnview").join("trace");
    fs::create_dir_all(&trace_dir)?;

    let log_file = trace_dir.join("slnview.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Tracing initialized to {:?}", log_file);
    Ok(())
}
