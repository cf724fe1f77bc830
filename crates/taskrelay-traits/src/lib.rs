//! TaskRelay Traits - Shared data types and collaborator interfaces.
//!
//! This crate provides the shared vocabulary used across the TaskRelay workspace:
//! - Model candidates, fallback entries and availability snapshots
//! - Resolution requests/results and their provenance
//! - Session messages and session state as seen by the dispatcher
//! - Delegated task state and report metadata
//! - Collaborator traits (SessionBackend, BackgroundManager, AvailabilitySource)
//! - Dispatch hook extension points
//! - The DelegateError taxonomy

pub mod backend;
pub mod error;
pub mod hooks;
pub mod model;
pub mod session;
pub mod task;

// ── Top-level re-exports ─────────────────────────────────────────────

// Error types
pub use error::{DelegateError, Result};

// Model and resolution types
pub use model::{
    AvailabilitySnapshot, FallbackEntry, ModelAvailability, ModelCandidate, Provenance,
    ResolutionIntent, ResolutionPolicy, ResolutionRequest, ResolutionResult,
};

// Session types
pub use session::{MessagePart, MessageRole, SessionMessage, SessionState};

// Task types
pub use task::{DelegatedTask, TaskMetadata, TaskOutcome, TaskReport, TaskStatus};

// Collaborators
pub use backend::{
    AvailabilitySource, BackgroundManager, LaunchInput, PromptRequest, ResumeInput,
    SessionBackend, ToolPermissions,
};

// Hooks
pub use hooks::{DispatchHooks, DispatchMode, DispatchPlan, NoopHooks, PollTick};
