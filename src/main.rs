use std::sync::Arc;

use anyhow::Context;

use intake_assist::channels::{self, CliChannel};
use intake_assist::config::AppConfig;
use intake_assist::controller::SessionController;
use intake_assist::intake::IntakeMachine;
use intake_assist::outbox::{FileOutbox, OutboxEmitter};
use intake_assist::routes::{StatusRouteState, status_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("🩺 Intake Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Doctors: {}", config.intake.doctors.join(", "));
    eprintln!("   Locations: {}", config.intake.locations.join(", "));
    eprintln!("   Outbox: {}", config.outbox_dir.display());
    if let Some(port) = config.http_port {
        eprintln!("   Status API: http://0.0.0.0:{}/api/outbox", port);
    }
    eprintln!("   Type `restart` to start over. Ctrl+D to exit.\n");

    // ── Outbox ───────────────────────────────────────────────────────────
    tokio::fs::create_dir_all(&config.outbox_dir)
        .await
        .with_context(|| format!("failed to create outbox dir {}", config.outbox_dir.display()))?;
    let emitter = OutboxEmitter::new(Arc::new(FileOutbox::new(&config.outbox_dir)));

    let controller = Arc::new(SessionController::new(
        IntakeMachine::new(config.intake.clone()),
        emitter,
        config.session_idle_timeout,
    ));

    // ── Status API ───────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = status_routes(StatusRouteState {
            controller: Arc::clone(&controller),
        });
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
            .await
            .with_context(|| format!("failed to bind status API port {port}"))?;
        tracing::info!(port, "Status API started");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Status API stopped");
            }
        });
    }

    channels::serve(Arc::new(CliChannel::new()), controller, config.prune_interval).await?;

    tracing::info!("Shutting down");
    Ok(())
}
