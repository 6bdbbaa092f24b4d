use std::env;
use std::path::PathBuf;

use slnview_subprocess::{parse_workspace_roots, run_subprocess, SubprocessOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut options = SubprocessOptions {
        workspace_roots: vec![],
        settings_path: None,
        no_watch: false,
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--workspace-roots" => {
                i += 1;
                if i < args.len() {
                    options.workspace_roots = parse_workspace_roots(&args[i])?;
                }
            }
            "--settings-path" => {
                i += 1;
                if i < args.len() {
                    options.settings_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--no-watch" => options.no_watch = true,
            _ => {}
        }
        i += 1;
    }

    run_subprocess(options).await
}
