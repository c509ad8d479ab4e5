//! `ca-cli run` — executes exactly one turn and prints the result.
//! Grounded on the gateway's own one-shot `run` subcommand: resolve or
//! create a session, build the turn input, run it, print the outcome.
//! Everything this command wires together (registry, persistence, rate
//! gate, planner, pricing, coordinator) lives only for the lifetime of
//! the process — there is no session store durable across invocations
//! the way the gateway's is.

use chrono::Utc;
use serde::Serialize;

use ca_billing::PricingCache;
use ca_context::planner::ContextPlanner;
use ca_domain::config::Config;
use ca_domain::model::{normalize_tool_permissions, ActiveAgent, RoomMode, TurnStatus};
use ca_providers::ProviderRegistry;
use ca_persistence::MemoryPersistence;
use ca_runtime::{RateGate, TurnCoordinator, TurnRequest};
use ca_tools::backends::{HttpSearchBackend, SearchBackend};

use crate::backends::{NullFileReadBackend, NullSearchBackend};

#[derive(Serialize)]
struct RunOutput {
    turn_id: String,
    status: String,
    assistant_output: String,
}

pub async fn run(
    config: Config,
    message: String,
    session: String,
    room: Option<String>,
    model: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let registry = ProviderRegistry::from_config(&config.llm)?;
    let persistence = MemoryPersistence::new();
    let rate_gate = RateGate::new(config.quota.clone());
    let planner = ContextPlanner::new(
        config.context.max_output_tokens,
        config.context.summary_trigger_ratio,
        config.context.prune_trigger_ratio,
        config.context.mandatory_summary_turn,
        config.context.recent_turns_to_keep as u32,
    );
    let pricing = PricingCache::new(config.llm.pricing.clone(), config.llm.pricing_version.clone());

    let (mode, active_agents, manager_model_alias, max_rounds, max_invocations) = match &room {
        Some(room_key) => {
            let room_cfg = config
                .rooms
                .get(room_key)
                .ok_or_else(|| anyhow::anyhow!("room '{room_key}' is not defined in config.rooms"))?;

            let mut active_agents = Vec::with_capacity(room_cfg.agent_keys.len());
            for agent_key in &room_cfg.agent_keys {
                let agent_cfg = config
                    .agents
                    .get(agent_key)
                    .ok_or_else(|| anyhow::anyhow!("agent '{agent_key}' is not defined in config.agents"))?;
                active_agents.push(ActiveAgent {
                    agent_id: Some(agent_cfg.agent_key.clone()),
                    agent_key: Some(agent_cfg.agent_key.clone()),
                    name: agent_cfg.name.clone(),
                    model_alias: agent_cfg.model_alias.clone(),
                    role_prompt: agent_cfg.role_prompt.clone(),
                    tool_permissions: normalize_tool_permissions(&agent_cfg.tool_permissions),
                });
            }

            let manager_model_alias = matches!(room_cfg.mode, RoomMode::Orchestrator)
                .then(|| room_cfg.orchestrator.manager_model_alias.clone());

            (room_cfg.mode, active_agents, manager_model_alias, room_cfg.orchestrator.max_depth, room_cfg.orchestrator.max_specialist_invocations)
        }
        None => {
            let agent = ActiveAgent {
                agent_id: None,
                agent_key: Some("cli".into()),
                name: "CLI Agent".into(),
                model_alias: model.unwrap_or_else(|| "default".into()),
                role_prompt: "You are a helpful assistant answering a single command-line request.".into(),
                tool_permissions: vec![],
            };
            (RoomMode::Standalone, vec![agent], None, 1, 1)
        }
    };

    let turn_index = persistence.turn_count(&session) as i64;

    let coordinator = TurnCoordinator::new(registry, persistence, rate_gate, planner, pricing);

    let request = TurnRequest {
        user_id: "cli-user".into(),
        room_id: room,
        session_id: session,
        turn_index,
        mode,
        active_agents,
        manager_model_alias,
        user_input: message,
        max_output_tokens: None,
        max_rounds,
        max_invocations,
    };

    let search_backend: Box<dyn SearchBackend> = match std::env::var("TAVILY_API_KEY") {
        Ok(api_key) => Box::new(HttpSearchBackend::new(api_key)),
        Err(_) => Box::new(NullSearchBackend),
    };

    let result = coordinator
        .execute_turn(request, search_backend.as_ref(), &NullFileReadBackend, Utc::now())
        .await?;

    if json_output {
        let output = RunOutput {
            turn_id: result.turn_id,
            status: status_label(result.status).into(),
            assistant_output: result.assistant_output,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", result.assistant_output);
    }

    Ok(())
}

fn status_label(status: TurnStatus) -> &'static str {
    match status {
        TurnStatus::Running => "running",
        TurnStatus::Partial => "partial",
        TurnStatus::Completed => "completed",
        TurnStatus::Failed => "failed",
    }
}
