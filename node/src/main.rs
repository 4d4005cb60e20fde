mod aap_server;
mod settings;

use std::sync::Arc;
use trace_err::*;
use tracing::{error, info};

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(settings: &settings::Settings) {
    let log_level = std::env::var("TERN_NODE_LOG_LEVEL")
        .ok()
        .or_else(|| settings.log_level.clone())
        .and_then(|s| s.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);

    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
    let filter = EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();
}

async fn run(settings: settings::Settings) -> anyhow::Result<()> {
    let bpa = Arc::new(tern_bpa::Bpa::start(settings.bpa.clone()));

    if let Some(bibe) = &settings.bibe {
        let tunnel_source: tern_bpv7::eid::Eid = match &bibe.tunnel_source {
            Some(eid) => eid.parse()?,
            None => bpa.node_eid().clone(),
        };
        bpa.register_cla(Arc::new(tern_bibe::BibeCla::new(
            tunnel_source,
            bpa.ingress(),
        )))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        bpa.register_agent(
            tern_bibe::BIBE_SINK,
            Arc::new(tern_bibe::DecapAgent::new(bpa.ingress())),
        )
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        info!("BIBE tunnelling enabled");
    }

    let cancel_token = tokio_util::sync::CancellationToken::new();
    let aap_task = settings.aap.as_ref().map(|aap| {
        tokio::spawn(aap_server::run(
            aap.listen.clone(),
            bpa.clone(),
            cancel_token.clone(),
        ))
    });

    // Wait for a terminate signal
    #[cfg(unix)]
    {
        let mut term_handler =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .trace_expect("Failed to register signal handlers");
        tokio::select! {
            _ = term_handler.recv() => {
                info!("Received terminate signal, stopping...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received CTRL+C, stopping...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received CTRL+C, stopping...");
    }

    cancel_token.cancel();
    if let Some(task) = aap_task {
        let _ = task.await;
    }
    if let Some(bpa) = Arc::into_inner(bpa) {
        bpa.shutdown().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some((settings, config_source)) = settings::init()? else {
        return Ok(());
    };

    init_logging(&settings);
    info!("{PKG_NAME} version {PKG_VERSION} starting...");
    info!("{config_source}");

    run(settings).await.inspect_err(|e| error!("{e}"))
}
