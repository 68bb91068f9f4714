use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use zendo::cli::{Cli, CliCommand, ListArgs};
use zendo_core::notify::TracingNotifier;
use zendo_core::App;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| CliCommand::List(ListArgs::default()));

    if let CliCommand::Mcp = command {
        let config = zendo::mcp::ServerConfig {
            data_dir: cli.data_dir.clone(),
            user_id: cli.user_id.clone(),
            log_filter: cli.log_filter.clone(),
            offline: cli.offline,
        };
        return zendo::mcp::run_server(config).await;
    }

    zendo::mcp::init_tracing(cli.log_filter.clone().or_else(|| Some("warn".into())))?;
    let config = zendo::config::from_cli(&cli)?;
    let app = App::open(config, Arc::new(TracingNotifier)).await?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    zendo::commands::execute(&app, command, cli.json, &mut handle).await
}
