//! The IP9258 switch driver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::error::{NotFoundError, SwitchError, TransportError, ValidationError};
use remoteswitch_domain::switch::{Device, Port, Terminal};

use crate::config::Ip9258Config;
use crate::error::Ip9258Error;
use crate::protocol::{GET_POWER, OUTLETS, parse_power, set_power};

/// Poll intervals without a successful status before the strip is considered gone.
const WATCHDOG_FACTOR: u32 = 5;

/// Resolves with the error that stopped the driver. The sender is dropped
/// without a value when the driver is closed normally.
pub type Failure = oneshot::Receiver<Ip9258Error>;

struct Shared {
    name: String,
    endpoint: String,
    username: String,
    password: String,
    http: Client,
    /// Outlet number by terminal name.
    outlets: HashMap<String, u8>,
    device: RwLock<Device>,
    bus: StateBus,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Shared {
    /// Mark the driver closed and stop its task. Returns `false` when it was
    /// already closed.
    fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Send `cmd` and return the page the strip answers with.
    async fn command(&self, cmd: &str) -> Result<String, Ip9258Error> {
        let response = self
            .http
            .get(format!("{}?cmd={cmd}", self.endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(Ip9258Error::Status(response.status()));
        }
        Ok(response.text().await?)
    }

    /// Send `cmd` and mirror the outlet states it answers with.
    async fn exchange(&self, cmd: &str) -> Result<(), Ip9258Error> {
        let body = self.command(cmd).await?;
        if let Some(snapshot) = self.apply(&parse_power(&body)?) {
            self.bus.publish(snapshot);
        }
        Ok(())
    }

    /// Update the mirrored state; returns a snapshot when something changed.
    /// Outlets without a terminal are ignored.
    fn apply(&self, states: &[(u8, bool)]) -> Option<Device> {
        let mut device = self.device.write().unwrap_or_else(PoisonError::into_inner);
        let mut changed = false;
        for terminal in device.ports.iter_mut().flat_map(|port| &mut port.terminals) {
            let Some(outlet) = self.outlets.get(&terminal.name) else {
                continue;
            };
            if let Some((_, state)) = states.iter().find(|(number, _)| number == outlet) {
                if terminal.state != *state {
                    terminal.state = *state;
                    changed = true;
                }
            }
        }
        changed.then(|| device.clone())
    }
}

async fn run(shared: Arc<Shared>, poll: Duration, failure: oneshot::Sender<Ip9258Error>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_read = Instant::now();

    let outcome = loop {
        tokio::select! {
            () = shared.cancel.cancelled() => break Ok(()),
            _ = ticker.tick() => {
                match shared.exchange(GET_POWER).await {
                    Ok(()) => last_read = Instant::now(),
                    Err(err) => {
                        tracing::warn!(device = %shared.name, error = %err, "status poll failed");
                    }
                }
                if last_read.elapsed() > poll * WATCHDOG_FACTOR {
                    break Err(Ip9258Error::Watchdog);
                }
            }
        }
    };

    if let Err(err) = outcome {
        tracing::error!(device = %shared.name, error = %err, "power strip failed, closing");
        shared.shutdown();
        if failure.send(err).is_err() {
            tracing::debug!(device = %shared.name, "power strip failure not observed");
        }
    }
    tracing::info!(device = %shared.name, "power strip stopped");
}

/// An Aviosys IP9258 power strip.
pub struct PowerStrip {
    shared: Arc<Shared>,
}

impl PowerStrip {
    /// Read the outlet states from the strip described by `config` and start
    /// polling.
    ///
    /// # Errors
    ///
    /// Returns the failure of the initial status request; nothing keeps
    /// running in that case.
    #[tracing::instrument(skip_all, fields(device = %config.name))]
    pub async fn open(
        config: &Ip9258Config,
        bus: StateBus,
    ) -> Result<(Self, Failure), Ip9258Error> {
        if let Some(outlet) = config.outlets.iter().find(|o| !OUTLETS.contains(&o.outlet)) {
            return Err(Ip9258Error::UnknownOutlet(outlet.outlet));
        }
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Ip9258Error::Client)?;
        let port = Port {
            name: config.port.clone(),
            index: 0,
            exclusive: false,
            terminals: config
                .outlets
                .iter()
                .map(|outlet| Terminal::new(outlet.name.clone(), outlet.index, false))
                .collect(),
        };
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            endpoint: config.endpoint(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
            outlets: config
                .outlets
                .iter()
                .map(|outlet| (outlet.name.clone(), outlet.outlet))
                .collect(),
            device: RwLock::new(Device::new(config.name.clone(), config.index, vec![port])),
            bus,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        let body = shared.command(GET_POWER).await?;
        shared.apply(&parse_power(&body)?);
        tracing::info!(endpoint = %shared.endpoint, "power strip found");

        let (failure_tx, failure_rx) = oneshot::channel();
        tokio::spawn(run(Arc::clone(&shared), config.poll_interval(), failure_tx));
        Ok((Self { shared }, failure_rx))
    }

    /// Commands for the terminals of `request` the strip knows. Other names
    /// are skipped.
    fn commands(&self, request: &Port) -> Result<Vec<String>, SwitchError> {
        let device = self
            .shared
            .device
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let port = device
            .port(&request.name)
            .ok_or_else(|| ValidationError::UnknownPort {
                port: request.name.clone(),
            })?;

        let mut commands = Vec::new();
        for wanted in &request.terminals {
            match self.shared.outlets.get(&wanted.name) {
                Some(outlet) if port.terminal(&wanted.name).is_some() => {
                    commands.push(set_power(*outlet, wanted.state));
                }
                _ => tracing::debug!(terminal = %wanted.name, "no such outlet, skipped"),
            }
        }
        Ok(commands)
    }
}

impl SwitchDevice for PowerStrip {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        self.shared
            .device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .port(name)
            .cloned()
            .ok_or_else(|| NotFoundError::port(name).into())
    }

    #[tracing::instrument(skip_all, fields(device = %self.shared.name, port = %request.name))]
    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        request.validate_request()?;
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::new("power strip closed").into());
        }
        for command in self.commands(&request)? {
            tracing::debug!(%command, "sending");
            self.shared
                .exchange(&command)
                .await
                .map_err(Ip9258Error::into_domain)?;
        }
        Ok(())
    }

    fn serialize(&self) -> Device {
        self.shared
            .device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close(&self) {
        if self.shared.shutdown() {
            tracing::info!(device = %self.shared.name, "power strip closed");
        }
    }
}

impl Drop for PowerStrip {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::Router;
    use axum::extract::{RawQuery, State};
    use axum::http::HeaderMap;
    use axum::routing::get;

    use super::*;
    use crate::config::OutletConfig;

    /// Basic credentials of the factory account.
    const AUTHORIZATION: &str = "Basic YWRtaW46MTIzNDU2Nzg=";
    const WAIT: Duration = Duration::from_secs(5);

    /// Serves the strip's `set.cmd` page on a local port.
    #[derive(Clone, Default)]
    struct FakeStrip {
        outlets: Arc<Mutex<[bool; 4]>>,
        broken: Arc<AtomicBool>,
        received: Arc<Mutex<Vec<String>>>,
    }

    impl FakeStrip {
        async fn spawn(&self) -> String {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap().to_string();
            let app = Router::new()
                .route("/set.cmd", get(answer))
                .with_state(self.clone());
            tokio::spawn(async move { axum::serve(listener, app).await });
            address
        }

        fn switch(&self, outlet: usize, on: bool) {
            self.outlets.lock().unwrap()[outlet - 1] = on;
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }

        fn page(&self) -> String {
            let outlets = self.outlets.lock().unwrap();
            let pairs: Vec<String> = (1..)
                .zip(outlets.iter())
                .map(|(outlet, on)| format!("p6{outlet}={}", u8::from(*on)))
                .collect();
            format!("<html>{}</html>", pairs.join(","))
        }
    }

    async fn answer(
        State(strip): State<FakeStrip>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
    ) -> (StatusCode, String) {
        if strip.broken.load(Ordering::SeqCst) {
            return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
        }
        if headers.get("authorization").is_none_or(|value| value != AUTHORIZATION) {
            return (StatusCode::UNAUTHORIZED, String::new());
        }
        let query = query.unwrap_or_default();
        if let Some(set) = query.strip_prefix("cmd=setpower+p6") {
            strip.received.lock().unwrap().push(query.clone());
            let bytes = set.as_bytes();
            strip.switch(usize::from(bytes[0] - b'0'), bytes[2] == b'1');
        } else if query != "cmd=getpower" {
            return (StatusCode::NOT_FOUND, String::new());
        }
        (StatusCode::OK, strip.page())
    }

    fn config(address: String) -> Ip9258Config {
        Ip9258Config {
            name: "Power".to_string(),
            address,
            poll_interval_ms: 50,
            timeout_ms: 500,
            ..Ip9258Config::default()
        }
    }

    async fn opened(strip: &FakeStrip, bus: StateBus) -> (PowerStrip, Failure) {
        let address = strip.spawn().await;
        PowerStrip::open(&config(address), bus).await.unwrap()
    }

    fn request(terminals: &[(&str, bool)]) -> Port {
        Port::request(
            "PS",
            terminals
                .iter()
                .map(|(name, state)| Terminal::request(*name, *state))
                .collect(),
        )
    }

    #[tokio::test]
    async fn should_expose_outlets_with_initial_state() {
        let strip = FakeStrip::default();
        strip.switch(2, true);

        let (power, _failure) = opened(&strip, StateBus::new(8)).await;

        let device = power.serialize();
        assert_eq!(device.name, "Power");
        assert_eq!(device.ports.len(), 1);
        let port = &device.ports[0];
        assert_eq!(port.name, "PS");
        assert!(!port.exclusive);
        let terminals: Vec<_> = port
            .terminals
            .iter()
            .map(|t| (t.name.as_str(), t.index))
            .collect();
        assert_eq!(
            terminals,
            [
                ("AC Outlet 1", 1),
                ("AC Outlet 2", 2),
                ("AC Outlet 3", 3),
                ("AC Outlet 4", 4)
            ]
        );
        assert_eq!(port.active().collect::<Vec<_>>(), ["AC Outlet 2"]);
    }

    #[tokio::test]
    async fn should_switch_outlets_and_publish_answer() {
        let strip = FakeStrip::default();
        let bus = StateBus::new(8);
        let mut states = bus.subscribe();
        let (power, _failure) = opened(&strip, bus).await;

        power
            .set_port(request(&[("AC Outlet 3", true), ("AC Outlet 9", true)]))
            .await
            .unwrap();

        assert_eq!(strip.received(), ["cmd=setpower+p63=1"]);
        let port = power.get_port("PS").unwrap();
        assert_eq!(port.active().collect::<Vec<_>>(), ["AC Outlet 3"]);
        let published = tokio::time::timeout(WAIT, states.recv()).await.unwrap().unwrap();
        assert!(published.ports[0].terminal("AC Outlet 3").unwrap().state);
    }

    #[tokio::test]
    async fn should_publish_changes_made_at_the_strip() {
        let strip = FakeStrip::default();
        let bus = StateBus::new(8);
        let mut states = bus.subscribe();
        let (power, _failure) = opened(&strip, bus).await;

        strip.switch(4, true);

        let published = tokio::time::timeout(WAIT, states.recv()).await.unwrap().unwrap();
        assert_eq!(published.ports[0].active().collect::<Vec<_>>(), ["AC Outlet 4"]);
        assert!(power.get_port("PS").unwrap().terminal("AC Outlet 4").unwrap().state);
    }

    #[tokio::test]
    async fn should_map_named_terminals_to_their_outlets() {
        let strip = FakeStrip::default();
        strip.switch(1, true);
        let address = strip.spawn().await;
        let config = Ip9258Config {
            outlets: vec![OutletConfig {
                name: "Amplifier".to_string(),
                index: 0,
                outlet: 3,
            }],
            ..config(address)
        };
        let (power, _failure) = PowerStrip::open(&config, StateBus::new(8)).await.unwrap();
        assert_eq!(power.get_port("PS").unwrap().active().count(), 0);

        power.set_port(request(&[("Amplifier", true)])).await.unwrap();

        assert_eq!(strip.received(), ["cmd=setpower+p63=1"]);
        let port = power.get_port("PS").unwrap();
        assert_eq!(port.terminals.len(), 1);
        assert_eq!(port.active().collect::<Vec<_>>(), ["Amplifier"]);
    }

    #[tokio::test]
    async fn should_refuse_outlet_the_strip_lacks() {
        let config = Ip9258Config {
            outlets: vec![OutletConfig {
                name: "Fifth".to_string(),
                index: 0,
                outlet: 5,
            }],
            ..Ip9258Config::default()
        };

        let result = PowerStrip::open(&config, StateBus::new(8)).await;

        assert!(matches!(result, Err(Ip9258Error::UnknownOutlet(5))));
    }

    #[tokio::test]
    async fn should_reject_unknown_port() {
        let strip = FakeStrip::default();
        let (power, _failure) = opened(&strip, StateBus::new(8)).await;

        let result = power
            .set_port(Port::request("PX", vec![Terminal::request("AC Outlet 1", true)]))
            .await;

        assert!(matches!(result, Err(SwitchError::Validation(_))));
        assert!(matches!(power.get_port("PX"), Err(SwitchError::NotFound(_))));
        assert!(strip.received().is_empty());
    }

    #[tokio::test]
    async fn should_fail_to_open_with_wrong_credentials() {
        let strip = FakeStrip::default();
        let address = strip.spawn().await;
        let config = Ip9258Config {
            password: "secret".to_string(),
            ..config(address)
        };

        let result = PowerStrip::open(&config, StateBus::new(8)).await;

        assert!(matches!(result, Err(Ip9258Error::Status(StatusCode::UNAUTHORIZED))));
    }

    #[tokio::test]
    async fn should_fail_and_close_when_strip_stops_answering() {
        let strip = FakeStrip::default();
        let (power, failure) = opened(&strip, StateBus::new(8)).await;
        strip.broken.store(true, Ordering::SeqCst);

        let err = tokio::time::timeout(WAIT, failure).await.unwrap().unwrap();

        assert!(matches!(err, Ip9258Error::Watchdog));
        let result = power.set_port(request(&[("AC Outlet 1", true)])).await;
        assert!(matches!(result, Err(SwitchError::Transport(_))));
        assert!(strip.received().is_empty());
    }

    #[tokio::test]
    async fn should_close_once_without_failure() {
        let strip = FakeStrip::default();
        let (power, failure) = opened(&strip, StateBus::new(8)).await;

        power.close();
        power.close();

        assert!(failure.await.is_err());
        let result = power.set_port(request(&[("AC Outlet 1", true)])).await;
        assert!(matches!(result, Err(SwitchError::Transport(_))));
    }
}
