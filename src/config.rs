use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,

    // Notificaciones
    pub notification_sound: String,
    pub notify_on_play: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&id| id != 0),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,

            // Notificaciones
            notification_sound: std::env::var("NOTIFICATION_SOUND")
                .unwrap_or_else(|_| "beep.mp3".to_string()),
            notify_on_play: std::env::var("NOTIFY_ON_PLAY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - The application id must be non-zero
    /// - Volume must be between 0.0 and 2.0
    /// - The notification sound must be set when notifications are enabled
    pub fn validate(&self) -> Result<()> {
        if self.application_id == 0 {
            anyhow::bail!("APPLICATION_ID must be a non-zero Discord snowflake");
        }

        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.notify_on_play && self.notification_sound.trim().is_empty() {
            anyhow::bail!("NOTIFICATION_SOUND must be set when NOTIFY_ON_PLAY is enabled");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Notifications: sound={}, on_play={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.notification_sound,
            self.notify_on_play,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,

            notification_sound: "beep.mp3".to_string(),
            notify_on_play: true,
        }
    }
}
