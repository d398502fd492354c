use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use overlay_core::{
    export, load_settings, ActionDescriptor, DebugOverlay, LifecycleSignal, OverlayModule,
};
use sensor_integration::{ChannelMotionSensor, MotionSample};
use shared::SortOrder;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
struct Args {
    /// Record a GET of this url in the network store.
    #[arg(long)]
    url: Option<String>,
    /// Enable shake-to-toggle and replay a scripted shake.
    #[arg(long)]
    shake: bool,
    /// Print share payloads in addition to the JSON snapshots.
    #[arg(long)]
    share: bool,
}

#[derive(Debug)]
#[allow(dead_code)]
struct PurchaseCompleted {
    order_id: u32,
    total_cents: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings();
    if args.shake {
        settings.enable_shake = true;
    }

    let global_actions = vec![ActionDescriptor::new("Print hello", || {
        println!("hello from a global action");
        Ok(())
    })];
    let overlay = DebugOverlay::new(
        settings.clone(),
        vec![
            OverlayModule::Logs,
            OverlayModule::Network,
            OverlayModule::Analytics,
            OverlayModule::actions("Actions", global_actions),
        ],
    )?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(overlay.log_layer())
        .init();

    info!(target: "demo", "demo host started");
    warn!(target: "demo::sync", error = %"timeout after 30s", "background sync failed");

    let analytics = overlay.analytics();
    analytics.log_event("screen_view", [("screen", "home")]);
    analytics.log_debug(&PurchaseCompleted {
        order_id: 42,
        total_cents: 1_999,
    });

    let home = overlay.bind_scope(
        "Home",
        [ActionDescriptor::new("Reload feed", || {
            info!(target: "demo::home", "feed reloaded");
            Ok(())
        })],
    );
    let settings_screen = overlay.bind_scope(
        "Settings",
        [ActionDescriptor::new("Reset onboarding", || {
            anyhow::bail!("onboarding state is locked")
        })],
    );
    home.handle(LifecycleSignal::Resume)?;
    settings_screen.handle(LifecycleSignal::Resume)?;

    let actions_module = overlay
        .controller()
        .select(3)
        .context("actions tab")?
        .clone();
    for action in overlay.controller().actions_for(&actions_module) {
        match action.invoke() {
            Ok(()) => println!("ran '{}'", action.title()),
            Err(failure) => println!("{failure}"),
        }
    }
    settings_screen.handle(LifecycleSignal::Pause)?;
    drop(settings_screen);
    println!(
        "active after leaving settings: {:?}",
        overlay
            .registry()
            .list_active()
            .iter()
            .map(|action| action.title().to_string())
            .collect::<Vec<_>>()
    );

    if let Some(url) = &args.url {
        let recorder = overlay.network_recorder();
        match recorder.send(recorder.client().get(url)).await {
            Ok(response) => println!("GET {url} -> {}", response.status),
            Err(error) => println!("GET {url} failed: {error:#}"),
        }
    }

    if args.shake {
        let sensor = Arc::new(ChannelMotionSensor::new("scripted"));
        overlay.controller().enable_shake(sensor.clone())?;
        let mut visibility = overlay.controller().subscribe_visibility();
        sensor.push_now(MotionSample::new(0.0, 9.8, 0.0));
        sensor.push_now(MotionSample::new(24.0, -6.0, 3.0));
        if tokio::time::timeout(Duration::from_secs(1), visibility.changed())
            .await
            .is_ok()
        {
            println!("shake toggled overlay, visible={}", overlay.controller().is_visible());
        }
    }

    let stores = overlay.stores();
    println!("logs: {}", export::export_json(&stores.logs.snapshot())?);
    println!("analytics: {}", export::export_json(&stores.analytics.snapshot())?);
    println!("network: {}", export::export_json(&stores.network.snapshot())?);

    if args.share {
        let logs = stores.logs.snapshot().sorted(SortOrder::default());
        if let Some(payload) = export::share_logs(&logs) {
            println!("{}\n{}", payload.subject, payload.body);
        }
        if let Some(payload) = export::share_network(&stores.network.snapshot().newest_first()) {
            println!("{}\n{}", payload.subject, payload.body);
        }
    }

    home.handle(LifecycleSignal::Destroy)?;
    overlay.shutdown();
    Ok(())
}
