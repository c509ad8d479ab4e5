pub mod backends;
pub mod dispatch;
pub mod registry;

pub use backends::{FileReadBackend, FileReadResult, FileReadStatus, HttpSearchBackend, SearchBackend, SearchResult};
pub use dispatch::dispatch_tool;
pub use registry::{build_tool_definitions, FILE_READ, SEARCH};
