use serde::{Deserialize, Serialize};
use taskrelay_traits::{DelegateError, Result};

/// Arguments of a delegation request, as a caller supplies them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegateTaskArgs {
    /// Short (3-5 word) task description
    pub description: String,
    /// Full instruction for the agent
    pub prompt: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subagent_type: Option<String>,
    #[serde(default)]
    pub run_in_background: Option<bool>,
    /// Continue this existing session instead of creating one
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Where a validated request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    Category(String),
    Agent(String),
    Continue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedArgs {
    pub description: String,
    pub prompt: String,
    pub target: TaskTarget,
    pub run_in_background: bool,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl DelegateTaskArgs {
    pub fn validate(&self) -> Result<ValidatedArgs> {
        let Some(run_in_background) = self.run_in_background else {
            return Err(DelegateError::InvalidArguments(
                "'run_in_background' must be set explicitly: false to wait for the result, \
                 true to launch and return immediately"
                    .to_string(),
            ));
        };

        let description = self.description.trim();
        if description.is_empty() {
            return Err(DelegateError::InvalidArguments(
                "'description' must not be empty".to_string(),
            ));
        }
        if self.prompt.trim().is_empty() {
            return Err(DelegateError::InvalidArguments(
                "'prompt' must not be empty".to_string(),
            ));
        }

        let target = match (
            present(&self.session_id),
            present(&self.category),
            present(&self.subagent_type),
        ) {
            (Some(session_id), _, _) => TaskTarget::Continue(session_id),
            (None, Some(_), Some(_)) => {
                return Err(DelegateError::InvalidArguments(
                    "Provide either 'category' or 'subagent_type', not both".to_string(),
                ));
            }
            (None, Some(category), None) => TaskTarget::Category(category),
            (None, None, Some(agent)) => TaskTarget::Agent(agent),
            (None, None, None) => {
                return Err(DelegateError::InvalidArguments(
                    "Provide 'category' or 'subagent_type' (or 'session_id' to continue a task)"
                        .to_string(),
                ));
            }
        };

        Ok(ValidatedArgs {
            description: description.to_string(),
            prompt: self.prompt.clone(),
            target,
            run_in_background,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> DelegateTaskArgs {
        DelegateTaskArgs {
            description: "Find usages".to_string(),
            prompt: "Find every caller of resolve()".to_string(),
            run_in_background: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_background_flag_is_required() {
        let mut args = args();
        args.category = Some("quick".to_string());
        args.run_in_background = None;
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("run_in_background"));
    }

    #[test]
    fn test_exactly_one_target() {
        let mut both = args();
        both.category = Some("quick".to_string());
        both.subagent_type = Some("explore".to_string());
        assert!(both.validate().is_err());

        assert!(args().validate().is_err());

        let mut agent = args();
        agent.subagent_type = Some(" explore ".to_string());
        agent.category = Some("  ".to_string());
        assert_eq!(
            agent.validate().unwrap().target,
            TaskTarget::Agent("explore".to_string())
        );
    }

    #[test]
    fn test_session_id_means_continuation() {
        let mut args = args();
        args.session_id = Some("ses_1".to_string());
        args.category = Some("quick".to_string());
        args.subagent_type = Some("explore".to_string());
        assert_eq!(
            args.validate().unwrap().target,
            TaskTarget::Continue("ses_1".to_string())
        );
    }

    #[test]
    fn test_blank_prompt_rejected() {
        let mut args = args();
        args.category = Some("quick".to_string());
        args.prompt = "  ".to_string();
        assert!(matches!(
            args.validate().unwrap_err(),
            DelegateError::InvalidArguments(_)
        ));
    }

    #[test]
    fn test_deserialize_from_tool_call() {
        let args: DelegateTaskArgs = serde_json::from_str(
            r#"{"description":"Fix typo","prompt":"fix it","category":"quick","run_in_background":true}"#,
        )
        .unwrap();
        let validated = args.validate().unwrap();
        assert!(validated.run_in_background);
        assert_eq!(validated.target, TaskTarget::Category("quick".to_string()));
    }
}
