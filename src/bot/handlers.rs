use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{application::CommandInteraction, id::GuildId},
    prelude::Context,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    audio::{
        interrupt::NotifyOutcome,
        item::TrackSummary,
        player::{PlayOutcome, SkipOutcome, StatusSnapshot, SubmitOutcome},
    },
    bot::{member_voice_channel, DesuuBot},
    sources::{query_identifier, ResolveError},
};

/// Entries listed by `/queue` before collapsing the rest.
const QUEUE_PREVIEW: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &DesuuBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "skip" | "pause" | "resume" | "shuffle" | "queue" => {
            if in_bot_channel(ctx, &command, bot, guild_id).await? {
                handle_control(ctx, &command, bot, guild_id).await?;
            }
        }
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DesuuBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel_id) = member_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if bot.bot_voice_channel(ctx, guild_id).await.is_none() {
        if let Err(e) = bot.join_voice_channel(ctx, guild_id, voice_channel_id).await {
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().content(format!("❌ {}", e)))
                .await?;
            return Ok(());
        }
    }

    let session = bot.registry.session(guild_id);
    let identifier = query_identifier(query);
    let result = if bot.config().notify_on_play {
        let (notified, played) = tokio::join!(
            session.notify(&bot.config().notification_sound),
            session.play(&identifier)
        );
        if let NotifyOutcome::Aborted(e) = notified {
            warn!("🔕 Sonido de notificación no disponible en guild {}: {}", guild_id, e);
        }
        played
    } else {
        session.play(&identifier).await
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(play_reply(&result)))
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DesuuBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(voice_channel_id) = member_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    match bot.join_voice_channel(ctx, guild_id, voice_channel_id).await {
        Ok(()) => {
            // Crea la sesión para que el backend quede listo
            bot.registry.session(guild_id);
            reply(ctx, command, &format!("🔊 Conectado a <#{}>", voice_channel_id), false).await
        }
        Err(e) => reply(ctx, command, &format!("❌ {}", e), true).await,
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DesuuBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.bot_voice_channel(ctx, guild_id).await.is_none() {
        return reply(ctx, command, "❌ No estoy en un canal de voz", true).await;
    }

    let drained = bot.leave_voice_channel(ctx, guild_id).await?;
    let content = if drained > 0 {
        format!("👋 Desconectado, {} canciones eliminadas de la cola", drained)
    } else {
        "👋 Desconectado".to_string()
    };
    reply(ctx, command, &content, false).await
}

/// skip / pause / resume / shuffle / queue
async fn handle_control(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DesuuBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = bot.registry.session(guild_id);

    let content = match command.data.name.as_str() {
        "skip" => skip_reply(&session.skip()),
        "pause" => {
            session.pause();
            "⏸️ Reproducción pausada".to_string()
        }
        "resume" => {
            session.resume();
            "▶️ Reproducción reanudada".to_string()
        }
        "shuffle" => {
            session.shuffle();
            "🔀 Cola mezclada".to_string()
        }
        _ => queue_reply(&session.status(), &session.queue_snapshot()),
    };

    reply(ctx, command, &content, false).await
}

/// Replies ephemerally and returns `false` when the caller is not in the
/// bot's voice channel.
async fn in_bot_channel(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DesuuBot,
    guild_id: GuildId,
) -> Result<bool> {
    let Some(bot_channel) = bot.bot_voice_channel(ctx, guild_id).await else {
        reply(ctx, command, "❌ No estoy en un canal de voz", true).await?;
        return Ok(false);
    };

    if member_voice_channel(ctx, guild_id, command.user.id) != Some(bot_channel) {
        reply(ctx, command, "❌ Debes estar en mi canal de voz", true).await?;
        return Ok(false);
    }

    Ok(true)
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

// Mensajes

fn play_reply(result: &Result<PlayOutcome, ResolveError>) -> String {
    match result {
        Ok(PlayOutcome::Track { title, outcome: SubmitOutcome::Started }) => {
            format!("🎵 Reproduciendo: **{}**", title)
        }
        Ok(PlayOutcome::Track { title, outcome: SubmitOutcome::Next }) => {
            format!("🎵 **{}** suena justo después de la notificación", title)
        }
        Ok(PlayOutcome::Track { title, outcome: SubmitOutcome::Queued { position } }) => {
            format!("➕ **{}** agregada a la cola (posición {})", title, position)
        }
        Ok(PlayOutcome::Playlist { name, count, started }) => {
            let verb = if *started { "reproduciendo" } else { "agregada" };
            format!("📜 Playlist **{}** {} ({} canciones)", name, verb, count)
        }
        Ok(PlayOutcome::Dropped) => "🔌 Me desconecté antes de terminar de cargar".to_string(),
        Err(ResolveError::NoMatch(_)) => "❌ No se encontraron resultados".to_string(),
        Err(e @ ResolveError::Failed { .. }) => format!("❌ {}", e),
    }
}

fn skip_reply(outcome: &SkipOutcome) -> String {
    match outcome {
        SkipOutcome::Stopped { title } => format!("⏭️ Saltada: **{}**", title),
        SkipOutcome::ResumeDropped { title } => {
            format!("⏭️ **{}** no se reanudará tras la notificación", title)
        }
        SkipOutcome::NothingPlaying => "❌ No hay nada reproduciéndose".to_string(),
    }
}

fn queue_reply(status: &StatusSnapshot, queue: &[TrackSummary]) -> String {
    let mut lines = vec![match status {
        StatusSnapshot::Idle => "⏹️ Nada reproduciéndose".to_string(),
        StatusSnapshot::Playing(track) => format!("🎵 Ahora: **{}**{}", track.title, length(track)),
        StatusSnapshot::Interrupted { notification, resume } => {
            let mut line = match notification {
                Some(track) => format!("🔔 Notificación: **{}**", track.title),
                None => "🔔 Cargando notificación".to_string(),
            };
            if let Some((track, position)) = resume {
                let position = humantime::format_duration(Duration::from_secs(position.as_secs()));
                line.push_str(&format!(", luego **{}** desde {}", track.title, position));
            }
            line
        }
    }];

    if queue.is_empty() {
        lines.push("📭 La cola está vacía".to_string());
    } else {
        lines.extend(
            queue
                .iter()
                .take(QUEUE_PREVIEW)
                .enumerate()
                .map(|(i, track)| format!("`{}.` {}{}", i + 1, track.title, length(track))),
        );
        if queue.len() > QUEUE_PREVIEW {
            lines.push(format!("… y {} más", queue.len() - QUEUE_PREVIEW));
        }
    }

    lines.join("\n")
}

/// ` (3m 20s)` when the length is known.
fn length(track: &TrackSummary) -> String {
    track
        .duration
        .map(|d| format!(" ({})", humantime::format_duration(Duration::from_secs(d.as_secs()))))
        .unwrap_or_default()
}
