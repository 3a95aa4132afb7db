use thiserror::Error;

/// Errors that abort a whole orchestration run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("llm provider is required")]
    MissingProvider,

    #[error("request cancelled")]
    Cancelled,

    #[error("llm completion failed: {0}")]
    Provider(anyhow::Error),

    #[error("token streamer failed: {0}")]
    Streamer(anyhow::Error),
}

/// Errors raised while executing a single tool call. These never abort a
/// round; the orchestrator turns them into a failure note for the model.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool \"{0}\"")]
    UnsupportedTool(String),

    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("tenant id is required")]
    TenantRequired,

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

impl ToolError {
    pub(crate) fn execution(err: anyhow::Error) -> Self {
        ToolError::ExecutionError(format!("{err:#}"))
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Maps a dotted settings path such as `provider.api_key` to the environment
/// variable that sets it.
pub fn to_env_var(field_path: &str) -> String {
    format!("SKIPPER_{}", field_path.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("provider.api_key"), "SKIPPER_PROVIDER__API_KEY");
        assert_eq!(to_env_var("type"), "SKIPPER_TYPE");
    }

    #[test]
    fn test_tool_error_messages() {
        assert_eq!(
            ToolError::UnsupportedTool("nope".into()).to_string(),
            "unknown tool \"nope\""
        );
        assert_eq!(
            ToolError::Unavailable("knowledge search".into()).to_string(),
            "knowledge search unavailable"
        );
    }
}
