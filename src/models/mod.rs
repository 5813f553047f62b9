//! Domain models for TeamSync.
//!
//! # Core Concepts
//!
//! ## Stored Entities
//!
//! - [`Project`]: A body of work with a status, a completion percentage and an
//!   optional deadline. The assistant creates projects and changes their
//!   status and progress, but never deletes them.
//! - [`Task`]: A unit of work inside a project. Read-only from the assistant's
//!   point of view.
//!
//! ## Ephemeral Entities
//!
//! - [`ChatMessage`]: One line of an assistant conversation. Transcripts live
//!   in memory with their session and are never persisted.

mod message;
mod project;
mod task;

pub use message::*;
pub use project::*;
pub use task::*;
