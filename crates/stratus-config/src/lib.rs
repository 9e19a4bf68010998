use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;


/// Model id that asks for vendor/family based selection instead of a named provider
pub const AUTO_MODEL: &str = "auto";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "./stratus.toml",
    "~/.config/stratus/config.toml",
    "~/.stratus.toml",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub license: LicenseConfig,
    /// Per-tool switches keyed by tool name
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,
    #[serde(default)]
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider reference ("openai.<name>") or "auto"
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Vendor used when `default_model` is "auto"
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Family substring used when `default_model` is "auto"
    #[serde(default = "default_family")]
    pub family: String,

    /// Named OpenAI-compatible provider configs
    #[serde(default)]
    pub openai: HashMap<String, OpenAIConfig>,
}

fn default_model() -> String {
    AUTO_MODEL.to_string()
}

fn default_vendor() -> String {
    "openai".to_string()
}

fn default_family() -> String {
    "gpt-4".to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            vendor: default_vendor(),
            family: default_family(),
            openai: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    /// Overrides the family reported for the model (defaults to the model name)
    pub family: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path of the capability manifest (JSON list of tool descriptors)
    pub manifest_path: Option<String>,
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
    /// Number of most recent messages kept when history is pruned
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Optional cap on model rounds per chat; unbounded when absent
    pub max_rounds: Option<usize>,
    #[serde(default = "default_issue_url")]
    pub issue_url: String,
}

fn default_max_tool_result_chars() -> usize {
    8000
}

fn default_history_window() -> usize {
    10
}

fn default_issue_url() -> String {
    "https://github.com/stratus-dev/stratus/issues/new".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            manifest_path: None,
            max_tool_result_chars: default_max_tool_result_chars(),
            history_window: default_history_window(),
            max_rounds: None,
            issue_url: default_issue_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    Free,
    #[default]
    Pro,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseConfig {
    #[serde(default)]
    pub tier: LicenseTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Commands switched off within an otherwise enabled tool
    #[serde(default)]
    pub disabled_commands: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub profile: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
}

fn default_cli_path() -> String {
    "aws".to_string()
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            profile: None,
            region: None,
            cli_path: default_cli_path(),
        }
    }
}

impl Config {
    /// Load configuration from `config_path`, or from the first default
    /// location that exists. No file at all yields the defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path_to_load = match config_path {
            Some(path) => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    anyhow::bail!("Configuration file '{}' does not exist", path);
                }
                Some(expanded)
            }
            None => DEFAULT_CONFIG_PATHS.iter().find_map(|path| {
                let expanded_path = shellexpand::tilde(path);
                if Path::new(expanded_path.as_ref()).exists() {
                    Some(expanded_path.to_string())
                } else {
                    None
                }
            }),
        };

        let Some(path) = path_to_load else {
            return Ok(Self::default());
        };

        let config_content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&config_content)
            .map_err(|e| anyhow::anyhow!("Failed to parse '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_overrides(
        config_path: Option<&str>,
        model_override: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(model) = model_override {
            config.providers.default_model = model;
            config.validate()?;
        }

        Ok(config)
    }

    /// Default location a fresh configuration is written to
    pub fn default_config_file() -> std::path::PathBuf {
        dirs::home_dir()
            .map(|mut path| {
                path.push(".config");
                path.push("stratus");
                path
            })
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        let reference = &self.providers.default_model;
        if reference != AUTO_MODEL {
            let (provider_type, config_name) = Self::parse_provider_reference(reference)?;
            match provider_type.as_str() {
                "openai" => {
                    if !self.providers.openai.contains_key(&config_name) {
                        anyhow::bail!(
                            "Provider config 'openai.{}' not found. Available: {:?}",
                            config_name,
                            self.providers.openai.keys().collect::<Vec<_>>()
                        );
                    }
                }
                other => anyhow::bail!("Unknown provider type '{}'. Valid types: openai", other),
            }
        }

        if self.agent.history_window == 0 {
            anyhow::bail!("agent.history_window must be greater than zero");
        }

        if self.agent.max_tool_result_chars == 0 {
            anyhow::bail!("agent.max_tool_result_chars must be greater than zero");
        }

        Ok(())
    }

    /// Parse a provider reference into (provider_type, config_name)
    pub fn parse_provider_reference(reference: &str) -> Result<(String, String)> {
        let parts: Vec<&str> = reference.split('.').collect();
        if parts.len() != 2 {
            anyhow::bail!(
                "Invalid provider reference '{}'. Expected format: '<provider_type>.<config_name>' or '{}'",
                reference,
                AUTO_MODEL
            );
        }
        Ok((parts[0].to_string(), parts[1].to_string()))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn is_entitled(&self) -> bool {
        self.license.tier == LicenseTier::Pro
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        self.tools.get(tool).map_or(true, |t| t.enabled)
    }

    pub fn is_command_disabled(&self, tool: &str, command: &str) -> bool {
        self.tools.get(tool).is_some_and(|t| {
            t.disabled_commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(command))
        })
    }
}
