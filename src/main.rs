use anyhow::Result;
use serenity::{
    model::{gateway::GatewayIntents, id::ApplicationId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;

use crate::audio::{songbird_backend::SongbirdBackends, SessionRegistry};
use crate::bot::DesuuBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("desuu_prime=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando desuu-prime v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Audio: songbird + yt-dlp comparten el mismo cliente HTTP
    let songbird = Songbird::serenity();
    let http = reqwest::Client::new();
    let resolver = Arc::new(YtDlpResolver::new(http.clone()));
    let backends = Arc::new(SongbirdBackends::new(
        Arc::clone(&songbird),
        http,
        config.default_volume,
    ));
    let registry = Arc::new(SessionRegistry::new(backends, resolver));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let application_id = ApplicationId::new(config.application_id);
    let handler = DesuuBot::new(config, registry);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .application_id(application_id)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // yt-dlp es la única dependencia externa
    let yt_dlp = tokio::process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
