use anyhow::{anyhow, Context, Result};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::conversation::SessionTag;
use crate::error::ChatError;
use crate::logging::LogLevel;
use crate::streaming::{Endpoint, RequestParams};

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIRNAME: &str = ".sidechat";

pub const ENV_PROVIDER_ID: &str = "env";
const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
const ENV_API_KEY: &str = "OPENAI_API_KEY";
const ENV_MODEL: &str = "OPENAI_MODEL";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    pub id: String,
    pub name: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
    #[serde(default = "default_system_prompt_id")]
    pub system_prompt_id: String,
    /// Left out of requests when absent; the generated file sets 0.7.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_soft_timeout_secs")]
    pub soft_timeout_secs: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_system_prompts")]
    pub system_prompts: Vec<SystemPrompt>,
}

fn default_system_prompt_id() -> String { "default".to_string() }
fn default_temperature() -> Option<f32> { Some(0.7) }
fn default_stream() -> bool { true }
fn default_soft_timeout_secs() -> u64 { 360 }

fn default_system_prompts() -> Vec<SystemPrompt> {
    vec![
        SystemPrompt {
            id: "default".to_string(),
            name: "Default Assistant".to_string(),
            content: "You are a helpful assistant.".to_string(),
        },
        SystemPrompt {
            id: "developer".to_string(),
            name: "Developer Assistant".to_string(),
            content: "You are an expert software developer. Provide clear, concise, and accurate \
                      technical answers with code examples when appropriate."
                .to_string(),
        },
        SystemPrompt {
            id: "creative".to_string(),
            name: "Creative Writer".to_string(),
            content: "You are a creative writing assistant. Help with storytelling, poetry, and \
                      creative content with imagination and flair."
                .to_string(),
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            selected_provider: None,
            selected_model: None,
            system_prompt_id: default_system_prompt_id(),
            temperature: default_temperature(),
            max_completion_tokens: None,
            stream: default_stream(),
            soft_timeout_secs: default_soft_timeout_secs(),
            log_level: LogLevel::default(),
            providers: Vec::new(),
            system_prompts: default_system_prompts(),
        }
    }
}

/// Everything one request needs, resolved from the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub endpoint: Endpoint,
    pub model: String,
    pub system_prompt: Option<String>,
    pub params: RequestParams,
}

impl Config {
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn active_prompt(&self) -> Option<&SystemPrompt> {
        self.system_prompts.iter().find(|p| p.id == self.system_prompt_id)
    }

    pub fn soft_timeout(&self) -> Duration {
        Duration::from_secs(self.soft_timeout_secs)
    }

    /// Resolve the selected provider and model. The model need not be listed
    /// under the provider; any id the endpoint accepts is allowed.
    pub fn selection(&self) -> Result<Selection, ChatError> {
        let provider = self
            .selected_provider
            .as_deref()
            .and_then(|id| self.provider(id))
            .ok_or(ChatError::ConfigurationMissing)?;
        let model = self
            .selected_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or(ChatError::ConfigurationMissing)?;

        Ok(Selection {
            endpoint: Endpoint { base_url: provider.base_url.clone(), api_key: provider.api_key.clone() },
            model: model.to_string(),
            system_prompt: self.active_prompt().map(|p| p.content.clone()),
            params: RequestParams {
                stream: self.stream,
                temperature: self.temperature,
                max_completion_tokens: self.max_completion_tokens,
            },
        })
    }

    pub fn select(&mut self, provider: &str, model: &str) -> Result<()> {
        if self.provider(provider).is_none() {
            return Err(anyhow!("Unknown provider '{}'", provider));
        }
        if model.trim().is_empty() {
            return Err(anyhow!("Model id cannot be empty"));
        }
        self.selected_provider = Some(provider.to_string());
        self.selected_model = Some(model.to_string());
        Ok(())
    }

    pub fn select_prompt(&mut self, id: &str) -> Result<()> {
        if !self.system_prompts.iter().any(|p| p.id == id) {
            return Err(anyhow!("Unknown system prompt '{}'", id));
        }
        self.system_prompt_id = id.to_string();
        Ok(())
    }

    pub fn session_tag(&self) -> SessionTag {
        SessionTag {
            model: self.selected_model.clone(),
            provider: self.selected_provider.clone(),
            system_prompt_id: Some(self.system_prompt_id.clone()),
        }
    }

    /// Add an `env` provider from `OPENAI_*` variables, selecting it when
    /// nothing else is selected.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(api_key) = var(ENV_API_KEY).filter(|k| !k.is_empty()) else {
            return;
        };
        let base_url = var(ENV_BASE_URL)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = var(ENV_MODEL).filter(|m| !m.is_empty());

        self.providers.retain(|p| p.id != ENV_PROVIDER_ID);
        self.providers.push(ProviderConfig {
            id: ENV_PROVIDER_ID.to_string(),
            name: "Environment".to_string(),
            base_url,
            api_key,
            models: model
                .iter()
                .map(|m| ModelConfig { id: m.clone(), name: m.clone() })
                .collect(),
        });

        if self.selected_provider.is_none() {
            if let Some(model) = model {
                self.selected_provider = Some(ENV_PROVIDER_ID.to_string());
                self.selected_model = Some(model);
            }
        }
    }
}

pub fn get_sidechat_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))
        .map(|home| home.join(CONFIG_DIRNAME))
}

pub fn load_config() -> Result<Config> {
    let mut config = load_config_from(&get_sidechat_dir()?)?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    Ok(config)
}

pub fn load_config_from(config_dir: &Path) -> Result<Config> {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_dir.exists() {
        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create sidechat config directory: {}", config_dir.display()))?;
    }

    if !config_path.exists() {
        let default_config = Config::default();
        write_config(&config_path, &default_config)?;

        if std::env::var(ENV_API_KEY).is_err() {
            println!(
                "{}",
                format!(
                    "Configuration file created at {}. Add a [[providers]] entry to start chatting.",
                    config_path.display()
                )
                .yellow()
            );
        }
        return Ok(default_config);
    }

    let toml_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file from {}", config_path.display()))?;

    let config: Config = toml::from_str(&toml_content)
        .with_context(|| format!("Failed to parse config file at {}", config_path.display()))?;

    Ok(config)
}

/// Write the config back, leaving out the environment-derived provider.
pub fn save_config_to(config_dir: &Path, config: &Config) -> Result<()> {
    let mut persisted = config.clone();
    persisted.providers.retain(|p| p.id != ENV_PROVIDER_ID);
    write_config(&config_dir.join(CONFIG_FILENAME), &persisted)
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(&get_sidechat_dir()?, config)
}

fn write_config(config_path: &Path, config: &Config) -> Result<()> {
    let toml_string = toml::to_string_pretty(config).context("Failed to serialize config")?;

    let comment = "# sidechat configuration file\n\
                   # Add providers as [[providers]] tables (id, name, base_url, api_key, models),\n\
                   # then pick one with selected_provider and selected_model.\n\
                   # OPENAI_API_KEY, OPENAI_BASE_URL and OPENAI_MODEL add an \"env\" provider.\n\n";
    let final_content = format!("{}{}", comment, toml_string);

    fs::write(config_path, final_content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))
}
