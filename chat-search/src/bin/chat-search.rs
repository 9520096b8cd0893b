//! CLI for conversational search
//!
//! # Usage
//!
//! ```bash
//! # Conversations with Ann about the launch plan, last 7 days
//! CHAT_SEARCH__SLACK__TOKEN=xoxp-... chat-search --with ann@example.com --topic "launch plan" --range last_7d
//!
//! # Group conversations and 1:1s with two people
//! chat-search --config chat-search.toml --with ann@example.com --with bob@example.com
//!
//! # Everything about an incident in #ops
//! chat-search --channel "#ops" --topic incident --limit 5
//!
//! # Try it against a built-in sample workspace
//! chat-search --demo --with ann@example.com --topic launch
//! ```

use chat_search::api::{ChatApi, MockWorkspace, SlackClient};
use chat_search::{Config, ConversationSearch, SearchRequest, TimeRange};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "chat-search")]
#[command(about = "Search Slack conversations with people, in channels, about topics", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Participant email; repeat for several people
    #[arg(short = 'w', long = "with", value_name = "EMAIL")]
    with: Vec<String>,

    /// Channel to search in (e.g. #general)
    #[arg(long)]
    channel: Option<String>,

    /// Topic keywords
    #[arg(short, long)]
    topic: Option<String>,

    /// latest, today, yesterday, last_7d, last_30d or all
    #[arg(short, long, default_value = "latest")]
    range: TimeRange,

    /// Maximum number of results
    #[arg(short, long)]
    limit: Option<usize>,

    /// Search a built-in sample workspace instead of Slack
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    chat_search::init_logging(&config.logging)?;

    let api: Arc<dyn ChatApi> = if cli.demo {
        info!("Using the demo workspace");
        Arc::new(demo_workspace())
    } else {
        Arc::new(SlackClient::new(&config.slack)?)
    };
    let engine = ConversationSearch::new(api, config.search.clone());

    let mut request = SearchRequest::default()
        .with_emails(cli.with)
        .with_time_range(cli.range);
    request.topic = cli.topic;
    request.channel = cli.channel;
    request.limit = cli.limit;

    let result = engine.search(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// Small workspace: a 1:1 with Ann, a group with Ann and Bob, and #launch.
fn demo_workspace() -> MockWorkspace {
    MockWorkspace::new("UDEMO", "Demo User", "demo@example.com")
        .with_user("UANN", "Ann", "ann@example.com")
        .with_user("UBOB", "Bob", "bob@example.com")
        .with_user("UCY", "Cy", "cy@example.com")
        .with_direct("DANN", "UANN")
        .with_group("GTEAM", "mpdm-demo--ann--bob-1", &["UANN", "UBOB"])
        .with_channel("CLAUNCH", "launch", &["UDEMO", "UANN", "UBOB", "UCY"])
        .with_message("DANN", "1700000100.000100", "UANN", "Draft of the launch plan is in the doc")
        .with_message("DANN", "1700000200.000200", "UDEMO", "Thanks <@UANN>, reading it now")
        .with_message("GTEAM", "1700000300.000300", "UBOB", "Can we move the launch to Thursday?")
        .with_reply(
            "GTEAM",
            "1700000300.000300",
            "1700000400.000400",
            "UANN",
            "Thursday works, updating the launch plan",
        )
        .with_message("CLAUNCH", "1700000500.000500", "UCY", "<!here> launch checklist: <https://example.com/checklist|checklist>")
        .with_message("CLAUNCH", "1700000600.000600", "UANN", "Marketing copy is ready")
        .with_message("CLAUNCH", "1700000700.000700", "UBOB", "Incident in staging, launch on hold")
}
