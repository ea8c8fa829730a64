use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{SimulatorError, SimulatorResult};

/// Source of the reference text embedded in the hidden instruction
#[async_trait]
pub trait CorpusLoader: Send + Sync {
    async fn load(&self) -> SimulatorResult<String>;
}

/// Loads the corpus, falling back to an empty one.
///
/// A missing corpus only weakens the simulation, so the failure is logged
/// and the session goes on.
pub async fn load_or_empty(loader: &dyn CorpusLoader) -> String {
    match loader.load().await {
        Ok(text) => text,
        Err(e) => {
            warn!("Proceeding without reference corpus: {}", e);
            String::new()
        }
    }
}

/// Concatenates every `.txt` and `.md` file of a directory, in file name order
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    dir: PathBuf,
}

impl DirectoryCorpus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_document(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"))
    }
}

#[async_trait]
impl CorpusLoader for DirectoryCorpus {
    async fn load(&self) -> SimulatorResult<String> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            SimulatorError::CorpusUnavailable(format!("{}: {}", self.dir.display(), e))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && Self::is_document(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(SimulatorError::CorpusUnavailable(format!(
                "no .txt or .md files in {}",
                self.dir.display()
            )));
        }

        let mut corpus = String::new();
        for path in &files {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    debug!(file = %path.display(), chars = text.chars().count(), "Loaded corpus file");
                    corpus.push_str(&text);
                    corpus.push('\n');
                }
                Err(e) => warn!("Skipping unreadable corpus file {}: {}", path.display(), e),
            }
        }

        info!(files = files.len(), "Reference corpus loaded");
        Ok(corpus)
    }
}
