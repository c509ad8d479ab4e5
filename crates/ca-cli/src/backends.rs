//! Tool backends for the CLI. Search goes out over HTTP when
//! `TAVILY_API_KEY` is set; file read has no workspace to read from in
//! this example, so it always reports "not found" rather than erroring.

use async_trait::async_trait;
use ca_domain::Result;
use ca_tools::backends::{FileReadBackend, FileReadResult, FileReadStatus, SearchBackend, SearchResult};

pub struct NullFileReadBackend;

#[async_trait]
impl FileReadBackend for NullFileReadBackend {
    async fn read(&self, file_id: &str, _room_id: Option<&str>, _session_id: Option<&str>) -> Result<FileReadResult> {
        Ok(FileReadResult {
            status: FileReadStatus::NotFound,
            content: None,
            error: Some(format!("no file store is configured for this session; cannot read {file_id}")),
        })
    }
}

pub struct NullSearchBackend;

#[async_trait]
impl SearchBackend for NullSearchBackend {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(vec![])
    }
}
