use chat_search::{Config, ConversationSearch};
use mcp_search_server::{router, AppState, SEARCH_TOOL};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration: optional file, then CHAT_SEARCH__* overrides
    let config_path = std::env::var("CHAT_SEARCH_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    chat_search::init_logging(&config.logging)?;
    info!("Starting mcp-search-server...");

    let engine = ConversationSearch::from_config(&config)?;
    info!("Using Slack API at {}", config.slack.api_base);

    let app = router(Arc::new(AppState { engine }));

    let addr = config.server.listen_addr.as_str();
    info!("MCP server listening on http://{}", addr);
    info!("Available tools: {}", SEARCH_TOOL);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
