use taskrelay_traits::ToolPermissions;

use crate::catalog::Agent;

/// Denied in every delegated session: no recursive delegation, no questions
/// to a user who is not watching.
const ALWAYS_DENIED: &[&str] = &["task", "delegate_task", "question"];

const WRITE_TOOLS: &[&str] = &["write", "edit", "patch"];

/// Tool permissions for a delegated session running `agent`.
pub fn tool_permissions(agent: Option<&Agent>) -> ToolPermissions {
    let mut tools = ToolPermissions::new();
    for tool in ALWAYS_DENIED {
        tools.deny(*tool);
    }

    if let Some(agent) = agent {
        if agent.read_only {
            for tool in WRITE_TOOLS {
                tools.deny(*tool);
            }
        }
        for tool in &agent.denied_tools {
            tools.deny(tool.clone());
        }
    }

    tools
}
