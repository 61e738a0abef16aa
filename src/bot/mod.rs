//! # Bot Module
//!
//! Discord side of desuu-prime: slash command registration, voice
//! connections and the glue between interactions and the per-guild
//! [`SessionRegistry`].
//!
//! ## Example
//!
//! ```rust,no_run
//! let config = Config::load()?;
//! let registry = Arc::new(SessionRegistry::new(backends, resolver));
//! let bot = DesuuBot::new(config, registry);
//! ```

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::SessionRegistry, config::Config};

/// Main Discord bot handler.
pub struct DesuuBot {
    config: Arc<Config>,
    /// Per-guild playback sessions
    pub registry: Arc<SessionRegistry>,
}

impl DesuuBot {
    pub fn new(config: Config, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands globally, or for `GUILD_ID` when set.
    ///
    /// Guild commands propagate in seconds, global ones can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects the bot to a voice channel.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        match manager.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Disconnects from voice and resets the guild's session: the queue is
    /// drained and output stopped.
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<usize> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let drained = self
            .registry
            .get(guild_id)
            .map(|session| session.disconnect())
            .unwrap_or(0);
        manager.remove(guild_id).await?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(drained)
    }

    /// Voice channel the bot is currently connected to in `guild_id`.
    pub async fn bot_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Option<ChannelId> {
        let manager = songbird::get(ctx).await?;
        let call = manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }
}

/// Voice channel `user_id` is sitting in, from the cache.
pub fn member_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

#[async_trait]
impl EventHandler for DesuuBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Resets the session when the bot is kicked or moved out of voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        warn!("🔌 Bot desconectado de voz en guild {}", guild_id);
        if let Some(session) = self.registry.get(guild_id) {
            session.disconnect();
        }
        if let Some(manager) = songbird::get(&ctx).await {
            if let Err(e) = manager.remove(guild_id).await {
                debug!("Llamada de guild {} ya eliminada: {:?}", guild_id, e);
            }
        }
    }
}
