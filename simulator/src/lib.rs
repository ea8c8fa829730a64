//! Rehearsal sessions with a simulated student.
//!
//! A session starts from a randomized persona, binds it into a chat context
//! seeded with a hidden instruction, and then alternates teacher and student
//! turns. Every answered turn is pushed to the remote session log in the
//! background. Sessions can be exported to CSV and resumed later.

pub mod controller;
pub mod conversation;
pub mod corpus;
pub mod error;
pub mod persona;
pub mod prompt;
pub mod sender;
pub mod snapshot;

#[cfg(test)]
mod test_support;

pub use controller::{SessionController, TurnOutcome};
pub use conversation::{ConversationSession, ConversationStore, Role, Turn};
pub use corpus::{load_or_empty, CorpusLoader, DirectoryCorpus};
pub use error::{SimulatorError, SimulatorResult};
pub use persona::{PersonaDescriptor, PersonaGenerator, StressResponse};
pub use sender::{classify_failure, FailureKind, RateLimitedSender, SendOutcome, SendPolicy};
pub use snapshot::{export_file_name, ImportedSnapshot};
