use anyhow::anyhow;
use std::path::PathBuf;
use slnview_core::explorer::{ExplorerActor, ExplorerMessage};
use slnview_core::settings::SettingsManager;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tokio::{io, io::AsyncWriteExt};
use tracing::warn;

pub struct SubprocessOptions {
    pub workspace_roots: Vec<PathBuf>,
    pub settings_path: Option<PathBuf>,
    /// When set the host forwards filesystem changes itself
    pub no_watch: bool,
}

/// Bridges the explorer actor to stdio: one `ExplorerMessage` per stdin
/// line in, one `ExplorerEvent` per stdout line out. Returns when either
/// side closes.
pub async fn run_subprocess(options: SubprocessOptions) -> anyhow::Result<()> {
    let settings_manager = match options.settings_path {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };

    let (actor, mut event_rx) = if options.no_watch {
        ExplorerActor::launch_unwatched(options.workspace_roots, settings_manager)
    } else {
        ExplorerActor::launch(options.workspace_roots, settings_manager)
    };

    let mut join_set: JoinSet<anyhow::Result<()>> = JoinSet::new();

    join_set.spawn(async move {
        let mut stdout = io::stdout();
        while let Some(event) = event_rx.recv().await {
            let json = serde_json::to_string(&event)?;
            let json = format!("{json}\n");
            stdout.write_all(json.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok(())
    });

    join_set.spawn(async move {
        let mut stdin = BufReader::new(io::stdin()).lines();
        while let Some(line) = stdin.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            // A bad line is the host's bug; keep serving the next ones.
            let message: ExplorerMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!(?e, line, "Ignoring unparseable message");
                    continue;
                }
            };
            actor.tx.send(message)?;
        }
        Ok(())
    });

    if let Some(result) = join_set.join_next().await {
        return match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(anyhow!(e)),
            Err(panic) => Err(anyhow!(panic)),
        };
    }
    Ok(())
}

/// Parses `--workspace-roots`, which is a JSON array of paths.
pub fn parse_workspace_roots(raw: &str) -> anyhow::Result<Vec<PathBuf>> {
    let roots: Vec<String> = serde_json::from_str(raw)?;
    Ok(roots.into_iter().map(PathBuf::from).collect())
}
