//! Session operations: create, prompt, poll, fetch.

mod creator;
mod fetcher;
mod poller;
mod prompt;

pub use creator::{create_child_session, session_title};
pub use fetcher::{NO_ASSISTANT_RESPONSE, NO_NEW_RESPONSE, extract_result, fetch_result};
pub use poller::{
    CompletionPoller, PollOutcome, StabilityRule, is_complete, is_complete_without_finish_reason,
};
pub use prompt::{parse_model_suggestion, send_prompt_with_retry};
