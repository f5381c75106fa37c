use committee_orchestrator::{
    agent::Orchestrator,
    api::start_server,
    audit::InMemoryResultSink,
    config::{init_tracing, CommitteeConfig},
    data::ContextBuilder,
    reasoning::{LlmGatewayClient, ReasoningClient, UnconfiguredReasoner},
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");

    let config = CommitteeConfig::from_env()?;

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Investment Committee Orchestrator - API Server");
    info!("Port: {}", api_port);

    let reasoning: Arc<dyn ReasoningClient> = match config.gateway.url {
        Some(_) => Arc::new(LlmGatewayClient::from_config(&config.gateway)?),
        None => {
            warn!("LLM_GATEWAY_URL not set; every agent will use its fallback opinion");
            Arc::new(UnconfiguredReasoner)
        }
    };
    let context_builder = ContextBuilder::from_config(&config.data)?;
    info!(sources = context_builder.source_count(), "Data sources configured");

    let orchestrator = Arc::new(
        Orchestrator::committee(reasoning, config)?
            .with_context_builder(context_builder)
            .with_sink(Arc::new(InMemoryResultSink::new())),
    );

    info!("Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
