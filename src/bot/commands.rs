use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        shuffle_command(),
        queue_command(),
        join_command(),
        leave_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

// Comandos de cola

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones en cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot y limpia la cola")
}
