use std::sync::Arc;

use realtime_voice_gateway::agent::{AgentDefinition, AgentRegistry, ToolDefinition};
use realtime_voice_gateway::config::GatewayConfig;
use realtime_voice_gateway::credential::{CredentialProvider, EnvCredentialProvider};
use realtime_voice_gateway::docstore::{DocumentStore, NullDocumentStore};
use realtime_voice_gateway::http::{self, AppState};
use realtime_voice_gateway::logger::ConversationLogger;
use realtime_voice_gateway::manager::SessionManager;
use realtime_voice_gateway::telemetry;
use realtime_voice_gateway::tool::ToolDispatcher;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(target: "main", bind_addr = %config.bind_addr, "starting realtime voice gateway");

    let registry = Arc::new(AgentRegistry::new("en-US"));
    for agent in starter_agents() {
        if agent.id == "Assistant_Root" {
            registry.register_root(agent);
        } else {
            registry.register(agent);
        }
    }

    let dispatcher = Arc::new(ToolDispatcher::new(registry.clone(), config.tool_call_timeout));
    let manager = Arc::new(SessionManager::new());
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentialProvider::new("UPSTREAM_BEARER_TOKEN"));
    if config.docstore.is_none() {
        tracing::warn!(target: "main", "DOCSTORE_* not configured, conversations will not be persisted");
    }
    let store: Arc<dyn DocumentStore> = Arc::new(NullDocumentStore);
    let logger = Arc::new(ConversationLogger::new(store, credentials.clone(), &config));

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        dispatcher,
        manager,
        credentials,
        logger,
    };

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(target: "main", addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// A minimal agent set so the gateway is runnable out of the box. Real
/// deployments replace this with agents whose tools are bound to actual
/// backing services.
fn starter_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            id: "Assistant_Root".to_string(),
            system_message:
                "You are a helpful assistant for {language} speakers. You route requests to specialized agents and keep answers short and suited for voice."
                    .to_string(),
            description: "Handles greetings and routes requests to specialized agents.".to_string(),
            tools: vec![],
        },
        AgentDefinition {
            id: "Assistant_Database_Agent".to_string(),
            system_message: "You are a database assistant. Confirm details with the user before mutating data."
                .to_string(),
            description: "Looks up and updates customer and order records.".to_string(),
            tools: vec![ToolDefinition::sync(
                "get_customer_record",
                "Retrieve the current customer's profile.",
                json!({"type": "object", "properties": {}}),
                |_params| Ok(json!({"status": "not_configured", "message": "no backing store wired"})),
            )],
        },
    ]
}
