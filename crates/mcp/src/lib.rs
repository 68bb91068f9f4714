mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use pmcp::types::capabilities::ServerCapabilities;
use pmcp::Server;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;
use zendo_core::config::AppConfig;
use zendo_core::notify::TracingNotifier;
use zendo_core::App;

/// Runtime configuration for the zendo MCP server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub data_dir: Option<PathBuf>,
    pub user_id: Option<String>,
    pub log_filter: Option<String>,
    pub offline: bool,
}

/// Launch the MCP server using the provided configuration.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    init_tracing(config.log_filter.clone())?;

    let app_config = AppConfig::discover(config.data_dir.clone())
        .context("failed to resolve data directory")?
        .with_user(config.user_id.clone())
        .with_offline(config.offline);
    let app = Arc::new(
        App::open(app_config.clone(), Arc::new(TracingNotifier))
            .await
            .context("failed to initialize task services")?,
    );
    let _reconnect = app.tasks().queue().spawn_reconnect_listener();

    let server = build_server(app.clone()).context("failed to build MCP server")?;

    eprintln!(
        "Starting zendo-mcp v{} (data dir: {}, user: {}{}) with tools: {}",
        env!("CARGO_PKG_VERSION"),
        app_config.data_dir().display(),
        app_config.user_id().unwrap_or("<none>"),
        if app_config.offline() { ", offline" } else { "" },
        tools::NAMES.join(", ")
    );

    server
        .run_stdio()
        .await
        .map_err(|err| anyhow::anyhow!("MCP server error: {}", err))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// protocol traffic and machine-readable output.
pub fn init_tracing(filter: Option<String>) -> Result<()> {
    let filter = filter.unwrap_or_else(|| "info".to_string());
    let directive: Directive = filter.parse()?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    Ok(())
}

fn build_server(app: Arc<App>) -> Result<Server> {
    let builder = Server::builder()
        .name("zendo-mcp")
        .version(env!("CARGO_PKG_VERSION"))
        .capabilities(ServerCapabilities::tools_only());

    let builder = tools::register(builder, app);
    tracing::debug!(tools = tools::NAMES.len(), "registered MCP tools");
    builder
        .build()
        .map_err(|err| anyhow::anyhow!(err.to_string()))
}
