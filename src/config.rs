use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::errors::{AppError, Result};
use crate::search::SearchPlatformKind;

/// Telegram refuses media groups with more than ten items.
pub const MAX_MEDIA_GROUP_SIZE: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub ytdlp_path: String,
    pub download_dir: PathBuf,
    pub allowed_user_ids: Vec<i64>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub batch_concurrency: usize,
    pub media_group_size: usize,
    pub tool_timeout_secs: u64,
    pub metadata_cache_ttl_secs: u64,
    pub search_platforms: Vec<SearchPlatformKind>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            ytdlp_path: "yt-dlp".to_string(),
            download_dir: PathBuf::from("temp_downloads"),
            allowed_user_ids: Vec::new(),
            spotify_client_id: None,
            spotify_client_secret: None,
            batch_concurrency: 3,
            media_group_size: MAX_MEDIA_GROUP_SIZE,
            tool_timeout_secs: 900,
            metadata_cache_ttl_secs: 300,
            search_platforms: vec![SearchPlatformKind::YouTube, SearchPlatformKind::SoundCloud],
        }
    }
}

impl AppConfig {
    /// Layers defaults, an optional config file and the process environment.
    ///
    /// Environment keys are the upper-case field names, e.g. `TELEGRAM_BOT_TOKEN`
    /// or `ALLOWED_USER_IDS=1,2,3`.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let path = match config_file {
            Some(path) => path.to_path_buf(),
            None => Self::get_config_path()?,
        };

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(config_file.is_some()))
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_user_ids")
                    .with_list_parse_key("search_platforms"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join("linkdrop").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_concurrency == 0 {
            return Err(AppError::InvalidInput("batch_concurrency must be at least 1".to_string()));
        }
        if self.search_platforms.is_empty() {
            return Err(AppError::InvalidInput("search_platforms must name at least one platform".to_string()));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        match self.tool_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn metadata_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_cache_ttl_secs)
    }

    pub fn group_size(&self) -> usize {
        self.media_group_size.clamp(1, MAX_MEDIA_GROUP_SIZE)
    }

    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        }
    }

    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }
}
