//! TaskRelay Core - delegates tasks to agent sessions.
//!
//! - `resolution`: fuzzy availability matching and the model priority pipeline
//! - `catalog`: built-in and configured categories and agents
//! - `session`: session creation, prompt delivery, completion polling, result fetching
//! - `dispatch`: the `TaskDispatcher` and its sync / background / continuation modes
//! - `backend`, `background`, `availability`: concrete collaborators

pub mod availability;
pub mod background;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod paths;
pub mod registry;
pub mod resolution;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use availability::{CachedAvailability, StaticAvailability};
pub use background::LocalBackgroundManager;
pub use backend::HttpSessionBackend;
pub use catalog::{Agent, Catalog, Category};
pub use config::{AgentConfig, AgentMode, CategoryConfig, DelegateConfig, PollingConfig};
pub use dispatch::{DelegateTaskArgs, ParentContext, TaskDispatcher};
pub use registry::{TaskRegistration, TaskRegistry};
pub use resolution::{fuzzy_match_model, normalize_model_name, resolve};

pub use taskrelay_traits::{
    AvailabilitySnapshot, BackgroundManager, DelegateError, DispatchHooks, ModelCandidate,
    Provenance, Result, SessionBackend, TaskMetadata, TaskOutcome, TaskReport,
};
