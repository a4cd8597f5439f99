/// `load_config` module: Loads a static YAML config and the environment secrets the remote clients need.
///
/// This module is the only place where untrusted YAML is parsed and mapped to typed settings.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`CliConfig`] (site and generation settings)
/// - Validate the site URL and derive the core's [`SynthesisConfig`] from it
/// - Read secrets (access tokens, API key) from the environment via [`Secrets::from_env`];
///   secrets never live in the YAML file
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path or variable named, and are surfaced
/// at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use docsynth_core::config::SynthesisConfig;
use reqwest::Url;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const SHAREPOINT_TOKEN_VAR: &str = "SHAREPOINT_ACCESS_TOKEN";
pub const GRAPH_TOKEN_VAR: &str = "GRAPH_ACCESS_TOKEN";
pub const OPENAI_KEY_VAR: &str = "AZURE_OPENAI_API_KEY";

#[derive(Debug)]
pub struct CliConfig {
    /// Absolute URL of the site, e.g. `https://contoso.sharepoint.com/sites/team`.
    pub site_url: Url,
    pub default_container: Option<String>,
    pub generation: GenerationSection,
}

#[derive(Debug, Deserialize)]
pub struct SiteSection {
    pub url: String,
    #[serde(default)]
    pub default_container: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-10-21".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

impl CliConfig {
    pub fn synthesis_config(&self) -> SynthesisConfig {
        let mut config = SynthesisConfig::new(self.site_url.path().trim_end_matches('/'));
        if let Some(container) = &self.default_container {
            config.default_container = container.clone();
        }
        config
    }
}

/// Credentials for the remote services.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub sharepoint_token: String,
    /// Falls back to the SharePoint token when unset.
    pub graph_token: String,
    pub openai_key: Option<String>,
}

impl Secrets {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let sharepoint_token = env::var(SHAREPOINT_TOKEN_VAR).map_err(|e| {
            error!(error = ?e, var = SHAREPOINT_TOKEN_VAR, "Missing secret in environment");
            anyhow!("{SHAREPOINT_TOKEN_VAR} must be set: {e}")
        })?;
        let graph_token = env::var(GRAPH_TOKEN_VAR).unwrap_or_else(|_| sharepoint_token.clone());
        let openai_key = env::var(OPENAI_KEY_VAR).ok();
        info!(
            graph_token_separate = graph_token != sharepoint_token,
            openai_key_set = openai_key.is_some(),
            "Loaded secrets from environment"
        );
        Ok(Self {
            sharepoint_token,
            graph_token,
            openai_key,
        })
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_key
            .as_deref()
            .ok_or_else(|| anyhow!("{OPENAI_KEY_VAR} must be set to generate content"))
    }
}

/// Loads a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        site: SiteSection,
        #[serde(default)]
        generation: GenerationSection,
    }

    let raw: RawConfig = serde_yaml::from_str(&config_content)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            e
        })
        .with_context(|| format!("Failed to parse config YAML {path_ref:?}"))?;

    let site_url = Url::parse(&raw.site.url)
        .with_context(|| format!("site.url is not a valid URL: {}", raw.site.url))?;
    if site_url.cannot_be_a_base() || site_url.host_str().is_none() {
        error!(site_url = %site_url, "site.url is not an absolute http(s) URL");
        return Err(anyhow!("site.url must be an absolute http(s) URL"));
    }

    let config = CliConfig {
        site_url,
        default_container: raw.site.default_container,
        generation: raw.generation,
    };
    info!(
        config_path = ?path_ref,
        site_url = %config.site_url,
        deployment = %config.generation.deployment,
        "Parsed config YAML successfully"
    );
    config.synthesis_config().trace_loaded();
    Ok(config)
}
