use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::client::{ClientOptions, default_tool_args};
use crate::core::retry::RetryPolicy;
use crate::core::step::DEFAULT_MAX_FIX_ATTEMPTS;
use crate::infra::walk::DEFAULT_IGNORES;

/// Config file names looked up in the workspace, first hit wins.
pub const CONFIG_FILES: [&str; 4] = ["gfactor.toml", "gfactor.yaml", "gfactor.json", ".gfactor.toml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Ignore patterns for file enumeration (in addition to .gitignore)
    pub ignore_patterns: Vec<String>,

    /// Project documentation included in every prompt
    pub context_glob: String,

    /// External LLM tool
    pub llm: LlmConfig,

    /// Fix loop settings
    pub verify: VerifyConfig,

    /// Default lint/test commands when the flags are omitted
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig
{
    pub program: String,

    /// `{prompt_file}` is replaced by the scratch prompt path
    pub args: Vec<String>,

    pub timeout_secs: u64,
    pub heartbeat_secs: u64,

    /// Launches per logical call, first one included
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,

    /// Directory for prompt files; OS temp dir when unset
    pub scratch_dir: Option<PathBuf>,

    /// Environment variable that must hold the tool's API key
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig
{
    pub max_fix_attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig
{
    pub lint: Option<String>,
    pub test: Option<String>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: DEFAULT_IGNORES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            context_glob: "**/*.mdc".to_string(),
            llm: LlmConfig::default(),
            verify: VerifyConfig::default(),
            commands: CommandsConfig::default(),
        }
    }
}

impl Default for LlmConfig
{
    fn default() -> Self
    {
        Self {
            program: "claude".to_string(),
            args: default_tool_args(),
            timeout_secs: 300,
            heartbeat_secs: 10,
            max_attempts: 4,
            retry_backoff_ms: 500,
            scratch_dir: None,
            api_key_env: None,
        }
    }
}

impl Default for VerifyConfig
{
    fn default() -> Self
    {
        Self { max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS }
    }
}

impl LlmConfig
{
    /// Client settings for a run whose tool works inside `working_dir`.
    pub fn client_options(
        &self,
        working_dir: &Path,
    ) -> ClientOptions
    {
        ClientOptions {
            program: self
                .program
                .clone(),
            args: self
                .args
                .clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            heartbeat: Duration::from_secs(self.heartbeat_secs),
            retry: RetryPolicy::new(self.max_attempts)
                .with_backoff(Duration::from_millis(self.retry_backoff_ms)),
            scratch_dir: self
                .scratch_dir
                .clone(),
            working_dir: Some(working_dir.to_path_buf()),
        }
    }
}

/// Load config for the workspace at `root`: the first config file found
/// there, then `GFACTOR_*` environment variables (`__` separates sections,
/// e.g. `GFACTOR_LLM__PROGRAM`). Missing everything yields the defaults.
pub fn load_config(root: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in &CONFIG_FILES
    {
        let path = root.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GFACTOR")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
