use committee_orchestrator::{
    agent::Orchestrator,
    audit::InMemoryResultSink,
    config::{init_tracing, CommitteeConfig},
    data::ContextBuilder,
    models::{CommitteeRequest, RiskAppetite, TimeHorizon},
    reasoning::{LlmGatewayClient, ReasoningClient, UnconfiguredReasoner},
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("debug");

    info!("Investment Committee Orchestrator starting");

    let config = CommitteeConfig::from_env()?;

    let reasoning: Arc<dyn ReasoningClient> = match config.gateway.url {
        Some(_) => Arc::new(LlmGatewayClient::from_config(&config.gateway)?),
        None => {
            warn!("LLM_GATEWAY_URL not set; every agent will use its fallback opinion");
            Arc::new(UnconfiguredReasoner)
        }
    };
    let context_builder = ContextBuilder::from_config(&config.data)?;
    let sink = Arc::new(InMemoryResultSink::new());

    let orchestrator = Orchestrator::committee(reasoning, config)?
        .with_context_builder(context_builder)
        .with_sink(sink);

    // Sample market event
    let request = CommitteeRequest {
        request_id: None,
        topic: "AI accelerator export controls".to_string(),
        headline: Some("US tightens export rules on data-center GPUs".to_string()),
        content: "Regulators announced tighter export controls on advanced accelerators \
                  shipped to several regions, effective next quarter."
            .to_string(),
        symbols: vec!["NVDA".to_string(), "AMD".to_string()],
        time_horizon: TimeHorizon::Medium,
        risk_appetite: RiskAppetite::Balanced,
        region: Some("US".to_string()),
        max_rounds: None,
    };

    info!(topic = %request.topic, "Running committee");

    match orchestrator.execute(request).await {
        Ok(outcome) => {
            let decision = &outcome.decision;
            println!("\n=== COMMITTEE DECISION ===");
            println!("Transcript ID: {}", outcome.transcript.transcript_id);
            println!("Action: {}", decision.action);
            println!("Confidence: {:.2}", decision.confidence);
            println!("Risk-adjusted confidence: {:.2}", decision.risk_adjusted_confidence);
            println!("Terminal: {:?}", decision.terminal);
            println!("Rounds: {}", outcome.transcript.rounds());

            println!("\nDissents:");
            for dissent in &decision.dissents {
                println!("  - {} ({}, round {})", dissent.agent, dissent.stage, dissent.round);
            }

            println!("\n=== COMMITTEE MINUTES ===");
            println!("{}", serde_json::to_string_pretty(&outcome.minutes)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Committee failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
