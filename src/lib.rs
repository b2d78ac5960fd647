//! Multimodal Assistant Router
//!
//! Routes a user's natural-language request, plus optional extracted
//! document text, through intent classification and on to a task-specific
//! response generator:
//! - Classifies (query, file snippet, recent history) into a closed intent set
//! - Branches into clarification when the goal is unclear
//! - Executes the resolved task against a fixed response template
//! - Keeps bounded conversational context across turns per session
//!
//! FLOW:
//! CLASSIFY → BRANCH → {CLARIFY | EXECUTE} → DONE

pub mod api;
pub mod clarifier;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod extract;
pub mod gemini;
pub mod generation;
pub mod models;
pub mod router;
pub mod session;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use router::{Branch, IntentRouter};
