use std::path::PathBuf;
use std::sync::Arc;

use signalk_cloud::{CloudRelay, LocalBus, MemoryBus, RelayConfig, RelayContext, PLUGIN_ID};
use signalk_core::{ConfigStorage, Delta, FileConfigStorage, PathValue, Update};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,signalk_cloud=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("SignalK cloud relay starting...");

    let storage = match std::env::var_os("SIGNALK_HOME") {
        Some(home) => FileConfigStorage::new(PathBuf::from(home)),
        None => FileConfigStorage::default_location(),
    };
    let self_urn = std::env::var("SIGNALK_SELF_URN")
        .unwrap_or_else(|_| format!("urn:mrn:signalk:uuid:{}", uuid::Uuid::new_v4()));
    let self_context = format!("vessels.{self_urn}");

    let config = RelayConfig::load(&storage)?;
    if config.endpoints.is_empty() {
        tracing::warn!(
            "No endpoints configured, add them to {}",
            storage
                .root()
                .join("plugin-config-data")
                .join(format!("{PLUGIN_ID}.json"))
                .display()
        );
    }

    let bus = MemoryBus::new(&self_context);
    let storage: Arc<dyn ConfigStorage> = Arc::new(storage);
    let ctx = RelayContext::new(Arc::new(bus.clone()), storage)?;
    let mut relay = CloudRelay::new(ctx);
    relay.start(&config);

    tracing::info!("Self context: {}", bus.self_context());

    let demo_handle = if std::env::var_os("SIGNALK_CLOUD_DEMO").is_some() {
        tracing::info!("Generating demo navigation data");
        let bus = bus.clone();
        Some(tokio::spawn(async move { generate_demo_data(bus).await }))
    } else {
        None
    };

    wait_for_shutdown(&mut relay).await;

    if let Some(handle) = demo_handle {
        handle.abort();
    }
    relay.stop().await;

    for (url, status) in relay.status() {
        tracing::info!("{}: {}", url, status);
    }
    tracing::info!("SignalK cloud relay stopped");
    Ok(())
}

/// Wait for Ctrl+C, reloading configuration on SIGHUP.
#[cfg(unix)]
async fn wait_for_shutdown(relay: &mut CloudRelay) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!("Cannot listen for SIGHUP: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                return;
            }
            _ = hangup.recv() => {
                tracing::info!("Received SIGHUP, reloading configuration");
                if let Err(e) = relay.reload_from_storage().await {
                    tracing::error!("Reload failed: {}", e);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_relay: &mut CloudRelay) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl+C, shutting down...");
}

/// Feed a slowly moving vessel into the local bus.
async fn generate_demo_data(bus: MemoryBus) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
    let start = tokio::time::Instant::now();
    let mut latitude = 60.1505;
    let mut longitude = 24.9517;

    bus.handle_message(
        "demo.generator",
        Delta::single(
            "vessels.self",
            Update::with_values(vec![
                PathValue::new("", serde_json::json!({"name": "Demo Vessel"})),
                PathValue::new("design.length", serde_json::json!({"overall": 11.9})),
            ]),
        ),
    );

    loop {
        interval.tick().await;

        latitude += 0.00001;
        longitude += 0.00002;
        let t = start.elapsed().as_secs_f64();
        let sog = 3.85 + (t / 10.0).sin() * 0.5;
        let cog = 1.52 + (t / 10.0).cos() * 0.1;

        let update = Update {
            source_ref: Some("demo.generator".to_string()),
            timestamp: Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            ..Update::with_values(vec![
                PathValue::new(
                    "navigation.position",
                    serde_json::json!({"latitude": latitude, "longitude": longitude}),
                ),
                PathValue::new("navigation.speedOverGround", serde_json::json!(sog)),
                PathValue::new("navigation.courseOverGroundTrue", serde_json::json!(cog)),
                PathValue::new("environment.wind.speedApparent", serde_json::json!(6.2 + t.sin())),
            ])
        };
        bus.handle_message("demo.generator", Delta::single("vessels.self", update));
    }
}
