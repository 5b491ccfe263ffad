//! # remoteswitchd: remoteswitch daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file) and install logging
//! - Open the configured local switches and register them with the hub
//! - Watch the background failure channel of polled switches and drop the
//!   ones that died
//! - Optionally connect to the MQTT broker to publish local switches as
//!   network services and to mirror remote ones through discovery
//! - Build the axum router, bind to a TCP port and serve
//! - Handle graceful shutdown (Ctrl-C / SIGTERM)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod device;

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use remoteswitch_adapter_http_axum::state::AppState;
use remoteswitch_adapter_mqtt::{MqttTransport, ServiceHost};
use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::services::discovery::DiscoveryWatcher;
use remoteswitch_app::services::hub::Hub;

use crate::config::Config;
use crate::device::AnySwitch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("unable to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let bus = StateBus::new(config.hub.event_capacity);
    let hub: Arc<Hub<AnySwitch>> = Arc::new(Hub::new(config.hub.event_capacity));
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    tasks.spawn(Arc::clone(&hub).forward(bus.subscribe(), cancel.clone()));

    // Local switches
    let mut local = Vec::with_capacity(config.switches.len());
    for switch_config in &config.switches {
        let (switch, failure) = device::open(switch_config, bus.clone())
            .await
            .with_context(|| format!("unable to open switch {:?}", switch_config.name()))?;
        let switch = Arc::new(switch);
        hub.add_switch(Arc::clone(&switch))?;
        if let Some(failure) = failure {
            device::watch_failure(Arc::clone(&hub), Arc::clone(&switch), failure);
        }
        local.push(switch);
    }

    // Network
    let mut broker = None;
    if config.mqtt.enabled {
        let (transport, driver) = MqttTransport::new(&config.mqtt);
        let driver_cancel = CancellationToken::new();
        let driver_task = tokio::spawn(driver.run(driver_cancel.clone()));
        tracing::info!(
            broker = %config.mqtt.broker_host,
            port = config.mqtt.broker_port,
            "mqtt enabled"
        );

        if config.expose.enabled {
            for switch in &local {
                let host = ServiceHost::new(
                    Arc::clone(switch),
                    transport.clone(),
                    bus.clone(),
                    &config.discovery.prefix,
                    config.mqtt.announce_interval(),
                );
                let token = cancel.clone();
                tasks.spawn(async move {
                    if let Err(err) = host.run(token).await {
                        tracing::error!(error = %err, "service host stopped");
                    }
                });
            }
        }

        if config.discovery.enabled {
            let watcher = DiscoveryWatcher::new(
                Arc::clone(&hub),
                transport.clone(),
                bus.clone(),
                config.discovery.watcher_config(),
            );
            let token = cancel.clone();
            tasks.spawn(async move {
                if let Err(err) = watcher.run(token).await {
                    tracing::error!(error = %err, "discovery stopped");
                }
            });
        }

        broker = Some((driver_cancel, driver_task));
    }

    // HTTP
    let state = AppState::new(Arc::clone(&hub));
    let app = remoteswitch_adapter_http_axum::router::build(
        state,
        config.server.static_dir.as_deref(),
    );

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("unable to bind {bind_addr}"))?;
    tracing::info!(address = %bind_addr, switches = hub.len(), "remoteswitchd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // hosts withdraw their announcements through the broker, so the broker goes last
    cancel.cancel();
    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            tracing::warn!(error = %err, "task ended abnormally");
        }
    }
    if let Some((driver_cancel, driver_task)) = broker {
        driver_cancel.cancel();
        driver_task.await?;
    }

    for switch in hub.switches() {
        hub.remove_switch(&switch);
    }
    tracing::info!("remoteswitchd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "unable to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown requested");
}
