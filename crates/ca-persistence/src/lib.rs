pub mod entities;
pub mod store;

pub use entities::{
    LlmCallEventRow, MessageInsert, SessionSummaryRow, ToolCallEventRow, TurnContextAuditRow, TurnRow,
};
pub use store::{MemoryPersistence, MemoryTx};
