use taskrelay_traits::{Result, SessionBackend};
use tracing::{debug, info};

/// Title given to delegated child sessions.
pub fn session_title(description: &str, agent: &str) -> String {
    format!("{} (@{} subagent)", description.trim(), agent)
}

/// Open a child session under `parent_session_id` in `directory`.
pub async fn create_child_session(
    backend: &dyn SessionBackend,
    parent_session_id: &str,
    directory: &str,
    description: &str,
    agent: &str,
) -> Result<String> {
    let title = session_title(description, agent);
    debug!(parent_session_id, directory, title = %title, "Creating child session");

    let session_id = backend
        .create_session(parent_session_id, &title, directory)
        .await?;

    info!(session_id = %session_id, parent_session_id, agent, "Child session created");
    Ok(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedBackend;

    #[test]
    fn test_session_title() {
        assert_eq!(
            session_title(" Find usages ", "explore"),
            "Find usages (@explore subagent)"
        );
    }

    #[tokio::test]
    async fn test_create_child_session_passes_scope() {
        let backend = ScriptedBackend::new();
        let id = create_child_session(&backend, "ses_parent", "/repo", "Find usages", "explore")
            .await
            .unwrap();

        let created = backend.created_sessions();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].session_id, id);
        assert_eq!(created[0].parent_id, "ses_parent");
        assert_eq!(created[0].directory, "/repo");
        assert_eq!(created[0].title, "Find usages (@explore subagent)");
    }
}
