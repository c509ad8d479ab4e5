pub mod coordinator;
pub mod invoker;
pub mod modes;
pub mod rate_gate;
pub mod routing_manager;

pub use coordinator::{TurnCoordinator, TurnRequest, TurnResult};
pub use invoker::{invoke_agent, InvocationOutcome, ToolInvocation};
pub use modes::{execute_orchestrator, execute_roundtable, execute_single, ModeOutcome, RoundEntry};
pub use rate_gate::RateGate;
pub use routing_manager::{
    build_orchestrator_synthesis_messages, evaluate_orchestrator_round, generate_orchestrator_synthesis, route_turn,
    RoutingDecision,
};
