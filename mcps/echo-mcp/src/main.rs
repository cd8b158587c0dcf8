//! Echo MCP Server
//!
//! Stand-in stdio tool server: one `echo` tool that returns its input.

use rmcp::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use echo_mcp::EchoMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echo_mcp=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    tracing::info!("Starting echo MCP server");

    let service = EchoMcpServer::new().serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
