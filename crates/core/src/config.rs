use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;

static DEFAULT_DB_NAME: &str = "zendo.sqlite3";
static QUEUE_FILE_NAME: &str = "offline-queue.json";
static CACHE_DIR_NAME: &str = "cache";
static ENV_DATA_DIR: &str = "ZENDO_DATA_DIR";
static ENV_USER: &str = "ZENDO_USER";
static ENV_OFFLINE: &str = "ZENDO_OFFLINE";
static ENV_LLM_API_KEY: &str = "ZENDO_LLM_API_KEY";
static ENV_LLM_API_KEY_FALLBACK: &str = "OPENAI_API_KEY";
static ENV_LLM_BASE_URL: &str = "ZENDO_LLM_BASE_URL";
static ENV_LLM_MODEL: &str = "ZENDO_LLM_MODEL";

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_LLM_MODEL: &str = "deepseek-chat";

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "zendo", "zendo"));

/// Connection settings for the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LlmSettings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(url) = env::var(ENV_LLM_BASE_URL) {
            settings.base_url = url;
        }
        if let Ok(model) = env::var(ENV_LLM_MODEL) {
            settings.model = model;
        }
        settings.api_key = env::var(ENV_LLM_API_KEY)
            .or_else(|_| env::var(ENV_LLM_API_KEY_FALLBACK))
            .ok()
            .filter(|key| !key.trim().is_empty());
        settings
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    db_path: PathBuf,
    queue_path: PathBuf,
    cache_dir: PathBuf,
    user_id: Option<String>,
    offline: bool,
    llm: LlmSettings,
}

impl AppConfig {
    /// Construct [`AppConfig`] by resolving the data directory using the provided override,
    /// environment variables, and platform defaults.
    pub fn discover(data_dir_override: Option<PathBuf>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir_override)?;
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory at {}", data_dir.display())
            })?;
        }
        let mut config = Self::from_data_dir(data_dir)?;
        config.user_id = env::var(ENV_USER).ok().filter(|v| !v.trim().is_empty());
        config.offline = env::var(ENV_OFFLINE).map(|v| is_truthy(&v)).unwrap_or(false);
        config.llm = LlmSettings::from_env();
        Ok(config)
    }

    /// Construct [`AppConfig`] directly from a resolved data directory.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        let db_path = data_dir.join(DEFAULT_DB_NAME);
        let queue_path = data_dir.join(QUEUE_FILE_NAME);
        let cache_dir = data_dir.join(CACHE_DIR_NAME);
        Ok(Self {
            data_dir,
            db_path,
            queue_path,
            cache_dir,
            user_id: None,
            offline: false,
            llm: LlmSettings::default(),
        })
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        if user_id.is_some() {
            self.user_id = user_id;
        }
        self
    }

    /// Forces the app to start offline; a flag only ever turns this on.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline |= offline;
        self
    }

    pub fn with_llm(mut self, llm: LlmSettings) -> Self {
        self.llm = llm;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Start with connectivity down: mutations are parked in the offline queue.
    pub fn offline(&self) -> bool {
        self.offline
    }

    pub fn llm(&self) -> &LlmSettings {
        &self.llm
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn resolve_data_dir(data_dir_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = data_dir_override {
        return Ok(dir);
    }

    if let Ok(env_dir) = env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(env_dir));
    }

    if cfg!(debug_assertions) {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let dev_dir = manifest_dir.join("..").join("tmp").join("dev-zendo");
        return Ok(dev_dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(base) = BaseDirs::new() {
            return Ok(base.home_dir().join(".zendo"));
        }
    }

    if let Some(project) = &*PROJECT_DIRS {
        return Ok(project.data_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".zendo"));
    }

    Ok(env::current_dir()?.join(".zendo"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derives_paths_from_data_dir() {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).expect("config");
        assert_eq!(config.db_path(), dir.path().join("zendo.sqlite3"));
        assert_eq!(config.queue_path(), dir.path().join("offline-queue.json"));
        assert_eq!(config.cache_dir(), dir.path().join("cache"));
        assert!(config.user_id().is_none());
        assert_eq!(config.llm().model, DEFAULT_LLM_MODEL);
    }

    #[test]
    fn explicit_user_overrides_only_when_present() {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::from_data_dir(dir.path().to_path_buf())
            .expect("config")
            .with_user(Some("alice".into()))
            .with_user(None);
        assert_eq!(config.user_id(), Some("alice"));
    }

    #[test]
    fn offline_flag_is_sticky_and_env_values_are_lenient() {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).expect("config");
        assert!(!config.offline());
        let config = config.with_offline(true).with_offline(false);
        assert!(config.offline());

        assert!(is_truthy(" Yes "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
