use secrecy::{ExposeSecret, Secret};
use service_core::config::{self as core_config, get_env, get_env_parsed, get_optional_env};
use service_core::error::AppError;

const OPENAI_DEFAULT_MODEL: &str = "gpt-5";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct AutopatcherConfig {
    pub common: core_config::Config,
    pub llm: LlmConfig,
    pub github: GitHubConfig,
    pub webhook: WebhookConfig,
    pub limits: LimitsConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: Secret<String>,
    pub model: String,
    /// Overrides the vendor API root (proxies, tests).
    pub base_url: Option<String>,
    pub max_output_tokens: i32,
    /// Sampling temperature; `None` leaves the vendor default.
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Gemini,
    Mock,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub raw_url: String,
    pub token: Option<Secret<String>>,
    pub webhook_secret: Option<Secret<String>>,
    pub max_file_bytes: usize,
    /// Cap on a pull request diff fetched for summarizing.
    pub max_diff_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub concurrency: usize,
    pub max_files_per_event: usize,
    /// Background jobs allowed at once; further deliveries get a 503.
    pub max_inflight_jobs: usize,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_upload_bytes: usize,
    pub max_diff_chars: usize,
    /// Requests per minute per client IP on the assist endpoints; 0 disables.
    pub rate_limit_per_minute: u32,
    /// Key the limiter on `X-Forwarded-For`. Enable only behind a proxy that
    /// sets the header itself.
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Logging settings. Read on their own, before tracing and the rest of the
/// configuration, so that configuration errors are logged.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::new(
            get_optional_env("LOG_LEVEL"),
            get_optional_env("OTLP_ENDPOINT"),
        )
    }

    fn new(log_level: Option<String>, otlp_endpoint: Option<String>) -> Self {
        Self {
            log_level: log_level.unwrap_or_else(|| "info".to_string()),
            otlp_endpoint,
        }
    }
}

impl AutopatcherConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_production();

        let provider: LlmProviderKind = get_env("LLM_PROVIDER", Some("openai"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let api_key = get_optional_env("LLM_API_KEY").or_else(|| match provider {
            LlmProviderKind::OpenAi => get_optional_env("OPENAI_API_KEY"),
            LlmProviderKind::Gemini => get_optional_env("GOOGLE_API_KEY"),
            LlmProviderKind::Mock => None,
        });

        let api_key = match (api_key, provider) {
            (Some(key), _) => key,
            (None, LlmProviderKind::Mock) => String::new(),
            (None, _) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "LLM_API_KEY is required in production but not set"
                )))
            }
            (None, _) => {
                tracing::warn!(provider = ?provider, "LLM_API_KEY not set; LLM calls will fail");
                String::new()
            }
        };

        let default_model = match provider {
            LlmProviderKind::Gemini => GEMINI_DEFAULT_MODEL,
            _ => OPENAI_DEFAULT_MODEL,
        };

        let webhook_secret = get_optional_env("GITHUB_WEBHOOK_SECRET").map(Secret::new);
        if webhook_secret.is_none() {
            if is_prod {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "GITHUB_WEBHOOK_SECRET is required in production but not set"
                )));
            }
            tracing::warn!("GITHUB_WEBHOOK_SECRET not set; webhook signatures will not be checked");
        }

        let config = AutopatcherConfig {
            common: common_config,
            llm: LlmConfig {
                provider,
                api_key: Secret::new(api_key),
                model: get_env("LLM_MODEL", Some(default_model), is_prod)?,
                base_url: get_optional_env("LLM_BASE_URL"),
                max_output_tokens: get_env_parsed("LLM_MAX_OUTPUT_TOKENS", 2048)?,
                temperature: get_optional_env("LLM_TEMPERATURE")
                    .map(|v| v.trim().parse::<f32>())
                    .transpose()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "LLM_TEMPERATURE has an invalid value: {}",
                            e
                        ))
                    })?,
                timeout_secs: get_env_parsed("LLM_TIMEOUT_SECS", 120)?,
            },
            github: GitHubConfig {
                api_url: get_env("GITHUB_API_URL", Some("https://api.github.com"), is_prod)?,
                raw_url: get_env(
                    "GITHUB_RAW_URL",
                    Some("https://raw.githubusercontent.com"),
                    is_prod,
                )?,
                token: get_optional_env("GITHUB_TOKEN").map(Secret::new),
                webhook_secret,
                max_file_bytes: get_env_parsed("MAX_FILE_BYTES", 512 * 1024)?,
                max_diff_bytes: get_env_parsed("MAX_DIFF_BYTES", 5 * 1024 * 1024)?,
            },
            webhook: WebhookConfig {
                concurrency: get_env_parsed("WEBHOOK_CONCURRENCY", 4)?,
                max_files_per_event: get_env_parsed("MAX_FILES_PER_EVENT", 20)?,
                max_inflight_jobs: get_env_parsed("MAX_INFLIGHT_JOBS", 32)?,
            },
            limits: LimitsConfig {
                max_upload_bytes: get_env_parsed("MAX_UPLOAD_BYTES", 1024 * 1024)?,
                max_diff_chars: get_env_parsed("MAX_DIFF_CHARS", 60_000)?,
                rate_limit_per_minute: get_env_parsed("RATE_LIMIT_PER_MINUTE", 30)?,
                trust_forwarded_for: get_env_parsed("TRUST_FORWARDED_FOR", false)?,
            },
            store: StoreConfig {
                backend: get_env("EVENT_STORE_BACKEND", Some("memory"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                redis_url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
                key_prefix: get_env("EVENT_STORE_PREFIX", Some("autopatcher"), is_prod)?,
                capacity: get_env_parsed("EVENT_LOG_CAPACITY", 500)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the service misbehave at runtime.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.webhook.concurrency == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WEBHOOK_CONCURRENCY must be at least 1"
            )));
        }
        if self.webhook.max_inflight_jobs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_INFLIGHT_JOBS must be at least 1"
            )));
        }
        if let Some(t) = self.llm.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "LLM_TEMPERATURE must be between 0.0 and 2.0"
                )));
            }
        }
        if self.store.capacity == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "EVENT_LOG_CAPACITY must be at least 1"
            )));
        }
        if self.llm.max_output_tokens <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LLM_MAX_OUTPUT_TOKENS must be positive"
            )));
        }
        Ok(())
    }

    /// Settings for local runs and tests: mock LLM, in-memory store, random
    /// port, no webhook secret.
    pub fn local() -> Self {
        AutopatcherConfig {
            common: core_config::Config {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            llm: LlmConfig {
                provider: LlmProviderKind::Mock,
                api_key: Secret::new(String::new()),
                model: "mock".to_string(),
                base_url: None,
                max_output_tokens: 2048,
                temperature: None,
                timeout_secs: 30,
            },
            github: GitHubConfig {
                api_url: "https://api.github.com".to_string(),
                raw_url: "https://raw.githubusercontent.com".to_string(),
                token: None,
                webhook_secret: None,
                max_file_bytes: 512 * 1024,
                max_diff_bytes: 5 * 1024 * 1024,
            },
            webhook: WebhookConfig {
                concurrency: 4,
                max_files_per_event: 20,
                max_inflight_jobs: 32,
            },
            limits: LimitsConfig {
                max_upload_bytes: 1024 * 1024,
                max_diff_chars: 60_000,
                rate_limit_per_minute: 0,
                trust_forwarded_for: false,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                redis_url: "redis://127.0.0.1:6379".to_string(),
                key_prefix: "autopatcher".to_string(),
                capacity: 500,
            },
        }
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.github
            .webhook_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
    }
}

impl std::str::FromStr for LlmProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "gemini" | "google" => Ok(LlmProviderKind::Gemini),
            "mock" => Ok(LlmProviderKind::Mock),
            _ => Err(format!("Invalid LLM provider: {}", s)),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            _ => Err(format!("Invalid event store backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names() {
        assert_eq!("OpenAI".parse::<LlmProviderKind>(), Ok(LlmProviderKind::OpenAi));
        assert_eq!("google".parse::<LlmProviderKind>(), Ok(LlmProviderKind::Gemini));
        assert!("anthropic-ish".parse::<LlmProviderKind>().is_err());
    }

    #[test]
    fn parses_store_backends() {
        assert_eq!("REDIS".parse::<StoreBackend>(), Ok(StoreBackend::Redis));
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn local_config_is_valid() {
        assert!(AutopatcherConfig::local().validate().is_ok());
    }

    #[test]
    fn observability_defaults_to_info_without_exporter() {
        assert_eq!(
            ObservabilityConfig::new(None, None),
            ObservabilityConfig {
                log_level: "info".to_string(),
                otlp_endpoint: None,
            }
        );
        let custom = ObservabilityConfig::new(
            Some("debug".to_string()),
            Some("http://collector:4317".to_string()),
        );
        assert_eq!(custom.log_level, "debug");
        assert_eq!(custom.otlp_endpoint.as_deref(), Some("http://collector:4317"));
    }

    #[test]
    fn out_of_range_temperature_and_job_limit_are_rejected() {
        let mut config = AutopatcherConfig::local();
        config.llm.temperature = Some(3.5);
        assert!(config.validate().is_err());

        let mut config = AutopatcherConfig::local();
        config.webhook.max_inflight_jobs = 0;
        assert!(config.validate().is_err());

        let mut config = AutopatcherConfig::local();
        config.llm.temperature = Some(0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AutopatcherConfig::local();
        config.webhook.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
