use config::{Config, Environment};
use serde::Deserialize;

use crate::errors::{to_env_var, ConfigError};
use crate::providers::configs::{
    OpenAiProviderConfig, ProviderConfig, DEFAULT_OPENAI_HOST, DEFAULT_OPENAI_MODEL,
};
use crate::providers::factory::ProviderType;

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Approximate token budget per model call; 0 disables compaction
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
    #[serde(default = "default_pre_retrieval_token_cap")]
    pub pre_retrieval_token_cap: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            context_budget: default_context_budget(),
            pre_retrieval_token_cap: default_pre_retrieval_token_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default)]
    pub global_tenant_id: Option<String>,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_max_per_source")]
    pub max_per_source: usize,
    #[serde(default = "default_hyde_timeout_secs")]
    pub hyde_timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            global_tenant_id: None,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_per_source: default_max_per_source(),
            hyde_timeout_secs: default_hyde_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("SKIPPER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&settings_path(field)),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&settings_path(field)),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Serde only reports the leaf name of a missing field; map the required
/// provider fields back to their full path
fn settings_path(field: &str) -> String {
    match field {
        "provider" | "type" => "provider.type".to_string(),
        "api_key" => "provider.api_key".to_string(),
        other => other.to_string(),
    }
}

fn default_max_rounds() -> usize {
    5
}

fn default_context_budget() -> usize {
    6000
}

fn default_pre_retrieval_token_cap() -> usize {
    1200
}

fn default_limit() -> usize {
    8
}

fn default_max_limit() -> usize {
    20
}

fn default_max_per_source() -> usize {
    2
}

fn default_hyde_timeout_secs() -> u64 {
    15
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_openai_host() -> String {
    DEFAULT_OPENAI_HOST.to_string()
}
