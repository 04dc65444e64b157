use std::sync::Arc;

use paperless_smtp::config::BridgeConfig;
use paperless_smtp::paperless::{DocumentStore, PaperlessClient};
use paperless_smtp::pipeline::{DocumentDispatcher, MessageOrchestrator};
use paperless_smtp::smtp::{SmtpServer, StopReason};
use paperless_smtp::tags::TagCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", paperless_smtp::Error::from(e));
            std::process::exit(2);
        }
    };

    // RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_directive())),
        )
        .with_target(false)
        .init();

    match run(config).await? {
        StopReason::Requested => Ok(()),
        StopReason::IntakeFailure => {
            tracing::error!("Mail intake stopped: tag mappings could not be refreshed");
            std::process::exit(1);
        }
    }
}

async fn run(config: BridgeConfig) -> paperless_smtp::Result<StopReason> {
    let store: Arc<dyn DocumentStore> = Arc::new(PaperlessClient::new(&config.paperless));
    let cache = Arc::new(TagCache::new(Arc::clone(&store)));
    let orchestrator = Arc::new(MessageOrchestrator::new(
        config.email_domain.clone(),
        cache,
        DocumentDispatcher::new(store),
    ));

    tracing::debug!(
        "Attempting to start server on {}:{}",
        config.smtp.host,
        config.smtp.port
    );
    let server = SmtpServer::new(config.smtp.clone(), orchestrator);
    let listener = server.bind().await?;

    tracing::info!(
        paperless = %config.paperless.url,
        domain = %config.email_domain,
        "Server is listening on {}:{}",
        config.smtp.host,
        config.smtp.port
    );

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            shutdown.stop(StopReason::Requested);
        }
    });

    Ok(server.serve(listener).await?)
}
