use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Persistence
    pub data_file: PathBuf,

    // AI Service
    pub gemini_api_key: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub ai_timeout_seconds: u64,
    pub ai_max_attempts: u32,
    pub ai_retry_base_delay_ms: u64,

    // Uploads
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Environment::from_str(&lookup("ENV").unwrap_or_else(|| "dev".to_string()));
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        // CORS
        let cors_allow_origins = lookup("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Persistence
        let data_file = PathBuf::from(
            lookup("PROJECTS_DATA_FILE").unwrap_or_else(|| "projects_db.json".to_string()),
        );

        // AI Service
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|s| !s.trim().is_empty())
            .context("GEMINI_API_KEY must be set")?;
        let gemini_api_url = lookup("GEMINI_API_URL")
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        url::Url::parse(&gemini_api_url).context("GEMINI_API_URL must be a valid URL")?;
        let gemini_model = lookup("GEMINI_MODEL")
            .unwrap_or_else(|| "gemini-2.5-flash-preview-05-20".to_string());
        let ai_timeout_seconds = parse_or(&lookup, "AI_TIMEOUT_SECONDS", 120); // LLM calls are slow
        let ai_max_attempts = parse_or::<_, u32>(&lookup, "AI_MAX_ATTEMPTS", 3).max(1);
        let ai_retry_base_delay_ms = parse_or(&lookup, "AI_RETRY_BASE_DELAY_MS", 1000);

        // Uploads
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024);

        Ok(Settings {
            env,
            server_addr,
            cors_allow_origins,
            data_file,
            gemini_api_key,
            gemini_api_url,
            gemini_model,
            ai_timeout_seconds,
            ai_max_attempts,
            ai_retry_base_delay_ms,
            max_upload_bytes,
        })
    }

    pub fn ai_retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.ai_retry_base_delay_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = Settings::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn blank_api_key_is_fatal() {
        assert!(Settings::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let settings = Settings::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(settings.env, Environment::Dev);
        assert_eq!(settings.server_addr, "0.0.0.0:8080");
        assert_eq!(settings.data_file, PathBuf::from("projects_db.json"));
        assert_eq!(settings.ai_max_attempts, 3);
        assert_eq!(settings.ai_retry_base_delay(), Duration::from_secs(1));
        assert_eq!(settings.cors_allow_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("ENV", "production"),
            ("AI_MAX_ATTEMPTS", "5"),
            ("AI_RETRY_BASE_DELAY_MS", "250"),
            ("CORS_ALLOW_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .unwrap();
        assert!(settings.env.is_prod());
        assert_eq!(settings.ai_max_attempts, 5);
        assert_eq!(settings.ai_retry_base_delay(), Duration::from_millis(250));
        assert_eq!(
            settings.cors_allow_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn invalid_ai_url_is_rejected() {
        let result = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_API_URL", "not a url"),
        ]));
        assert!(result.is_err());
    }
}
