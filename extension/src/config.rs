use anyhow::{Context, Result};
use serde::Deserialize;

use crate::relevance::RelevanceFilter;

const EMBEDDED_CONFIG: &str = include_str!("../extension.toml");

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub target: TargetConfig,
    pub api: ApiConfig,
    pub registration: RegistrationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Host a page must have to be monitored (exact match)
    pub host: String,
    /// Path prefix a page must start with
    pub path_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Used when the user has not saved an API base URL
    pub default_base_url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Register with a `username`, optionally after `/auth`
    Username,
    /// Register with `email` / `display_name` / `telegram_username`
    Contact,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RegistrationConfig {
    pub variant: ProtocolVariant,
    #[serde(default)]
    pub require_authentication: bool,
}

/// Per-deployment settings baked into the extension.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub target: TargetConfig,
    pub default_api_base_url: String,
    pub registration: RegistrationConfig,
}

impl DeploymentConfig {
    /// Configuration compiled into the extension bundle.
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_CONFIG).context("Embedded extension.toml is invalid")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConfigFile = toml::from_str(content).context("Failed to parse config file")?;

        if config.target.host.trim().is_empty() {
            anyhow::bail!("target.host must not be empty");
        }
        if !config.target.path_prefix.starts_with('/') {
            anyhow::bail!(
                "target.path_prefix must start with '/', got {:?}",
                config.target.path_prefix
            );
        }
        url::Url::parse(&config.api.default_base_url).context(format!(
            "api.default_base_url is not a valid URL: {}",
            config.api.default_base_url
        ))?;
        if config.registration.require_authentication
            && config.registration.variant == ProtocolVariant::Contact
        {
            anyhow::bail!("registration.require_authentication needs the username variant");
        }

        log::debug!(
            "Loaded deployment config: {}{} ({:?} registration)",
            config.target.host,
            config.target.path_prefix,
            config.registration.variant
        );

        Ok(Self {
            target: config.target,
            default_api_base_url: config.api.default_base_url,
            registration: config.registration,
        })
    }

    pub fn relevance_filter(&self) -> RelevanceFilter {
        RelevanceFilter::new(&self.target.host, &self.target.path_prefix)
    }
}
