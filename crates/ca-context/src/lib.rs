pub mod history;
pub mod planner;
pub mod summary;
pub mod token_estimator;

pub use history::{build_history_messages, build_tool_memory_block, ContextMessage, ContextRole, HistoryMessage, MessageRow, ToolCallRow};
pub use planner::{ContextPlanner, ContextPreparation};
pub use summary::{extract_summary_structure, generate_summary_text, SummaryGenerationResult, SummaryStructure};
