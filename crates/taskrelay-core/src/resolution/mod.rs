//! Model resolution: availability matching and the priority pipeline.

mod matcher;
mod pipeline;

pub use matcher::{fuzzy_match_model, normalize_model_name};
pub use pipeline::resolve;
