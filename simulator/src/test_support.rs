use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tic_core::chat::ChatProvider;
use tic_core::errors::{GeminiError, GeminiResult};
use tic_core::types::Content;
use tic_sheets::{CellValue, LogColumn, RowStore, SheetsError, SheetsResult};

/// Replays a fixed queue of replies and records every history it was given
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<GeminiResult<String>>>,
    calls: Mutex<Vec<Vec<Content>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<GeminiResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: GeminiResult<String>) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> Vec<Vec<Content>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Vec<Content> {
        self.calls().pop().unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn list_models(&self) -> GeminiResult<Vec<String>> {
        Ok(vec!["models/scripted".to_string()])
    }

    async fn generate(&self, history: &[Content]) -> GeminiResult<String> {
        self.calls.lock().unwrap().push(history.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GeminiError::ApiError("script exhausted".to_string())))
    }
}

pub fn rate_limited() -> GeminiResult<String> {
    Err(GeminiError::HttpError {
        status_code: 429,
        message: "Resource has been exhausted (e.g. check quota).".to_string(),
    })
}

/// Row store whose every call fails
#[derive(Debug, Default)]
pub struct FailingRowStore;

#[async_trait]
impl RowStore for FailingRowStore {
    async fn read_column(&self, _column: LogColumn) -> SheetsResult<Vec<String>> {
        Err(SheetsError::Storage("sheet unreachable".to_string()))
    }

    async fn append_row(&self, _row: Vec<CellValue>) -> SheetsResult<()> {
        Err(SheetsError::Storage("sheet unreachable".to_string()))
    }

    async fn overwrite_row(&self, _row_number: usize, _row: Vec<CellValue>) -> SheetsResult<()> {
        Err(SheetsError::Storage("sheet unreachable".to_string()))
    }
}
