use std::path::PathBuf;

use clap::Parser;
use zendo_mcp::{run_server, ServerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "zendo-mcp",
    version,
    about = "Model Context Protocol server for the zendo task manager"
)]
struct Args {
    /// Override the zendo data directory (defaults to the same resolution as the CLI)
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// User whose tasks the tools operate on (falls back to ZENDO_USER)
    #[arg(long = "user", value_name = "ID")]
    user_id: Option<String>,

    /// Override the tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE")]
    log_filter: Option<String>,

    /// Start with connectivity down; mutations wait in the offline queue
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServerConfig {
        data_dir: args.data_dir,
        user_id: args.user_id,
        log_filter: args.log_filter,
        offline: args.offline,
    };

    run_server(config).await
}
