use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const LLM_ENDPOINT_VAR: &str = "HF_LLM_ENDPOINT";
pub const EMBED_ENDPOINT_VAR: &str = "HF_EMBED_ENDPOINT";
pub const API_TOKEN_VAR: &str = "HF_TOKEN";

/// Hosted inference endpoints and the token used for both.
#[derive(Clone)]
pub struct EndpointConfig {
    pub llm_endpoint: Url,
    pub embed_endpoint: Url,
    pub api_token: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("llm_endpoint", &self.llm_endpoint.as_str())
            .field("embed_endpoint", &self.embed_endpoint.as_str())
            .field("api_token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl EndpointConfig {
    /// Validates raw values, treating blank strings the same as absent ones.
    pub fn new(
        llm_endpoint: Option<&str>,
        embed_endpoint: Option<&str>,
        api_token: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let llm_endpoint = parse_url(LLM_ENDPOINT_VAR, required(LLM_ENDPOINT_VAR, llm_endpoint)?)?;
        let embed_endpoint =
            parse_url(EMBED_ENDPOINT_VAR, required(EMBED_ENDPOINT_VAR, embed_endpoint)?)?;
        let api_token = required(API_TOKEN_VAR, api_token)?.to_string();

        Ok(Self {
            llm_endpoint,
            embed_endpoint,
            api_token,
            request_timeout,
        })
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}

/// Where the source document and its persisted index live.
#[derive(Debug, Clone)]
pub struct DocumentPaths {
    pub pdf_path: PathBuf,
    pub index_dir: PathBuf,
}
