//! The Remotebox switch driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::error::{NotFoundError, SwitchError, TransportError, ValidationError};
use remoteswitch_domain::switch::{Device, Port, Terminal};

use crate::config::RemoteboxConfig;
use crate::error::RemoteboxError;
use crate::model::{Model, parse_device_info};
use crate::protocol::{
    CONFIG_DUMP, CONFIG_LINES, ConfigMap, DEVICE_INFO, STATUS, Status, antenna_name,
    parse_config, parse_status, select_command,
};

/// How long the box may take to answer a handshake line.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
/// Poll intervals without a successful read before the box is considered gone.
const WATCHDOG_FACTOR: u32 = 5;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Resolves with the error that stopped the driver. The sender is dropped
/// without a value when the driver is closed normally.
pub type Failure = oneshot::Receiver<RemoteboxError>;

struct LineReader {
    lines: Lines<BufReader<BoxReader>>,
}

impl LineReader {
    fn new(reader: BoxReader) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Next non-empty line, without line breaks. Cancel safe.
    async fn next(&mut self) -> Result<String, RemoteboxError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(RemoteboxError::Closed);
            };
            let line = line.replace('\r', "");
            if !line.is_empty() {
                return Ok(line);
            }
        }
    }

    async fn next_within(&mut self, limit: Duration) -> Result<String, RemoteboxError> {
        tokio::time::timeout(limit, self.next())
            .await
            .map_err(|_| RemoteboxError::Timeout(limit))?
    }
}

async fn send(writer: &mut BoxWriter, bytes: &[u8]) -> Result<(), RemoteboxError> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

async fn identify(
    reader: &mut LineReader,
    writer: &mut BoxWriter,
) -> Result<(Model, String), RemoteboxError> {
    send(writer, DEVICE_INFO).await?;
    let line1 = reader.next_within(HANDSHAKE_TIMEOUT).await?;
    // legacy firmware only sends the version line
    let line2 = match reader.next_within(HANDSHAKE_TIMEOUT).await {
        Ok(line) => line,
        Err(RemoteboxError::Timeout(_)) => String::new(),
        Err(err) => return Err(err),
    };
    parse_device_info(&line1, &line2)
}

async fn read_configuration(
    reader: &mut LineReader,
    writer: &mut BoxWriter,
) -> Result<ConfigMap, RemoteboxError> {
    send(writer, CONFIG_DUMP).await?;
    let mut lines = Vec::with_capacity(CONFIG_LINES);
    for _ in 0..CONFIG_LINES {
        lines.push(reader.next_within(HANDSHAKE_TIMEOUT).await?);
    }
    parse_config(lines.iter().map(String::as_str))
}

fn build_ports(model: Model, config: &ConfigMap) -> Result<Vec<Port>, RemoteboxError> {
    let names = (0..model.antennas())
        .map(|antenna| antenna_name(config, antenna))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((1_i32..)
        .take(model.ports())
        .map(|index| Port {
            name: format!("{}{index}", model.prefix()),
            index,
            exclusive: false,
            terminals: (1_i32..)
                .zip(&names)
                .map(|(index, name)| Terminal::new(name.clone(), index, false))
                .collect(),
        })
        .collect())
}

struct Shared {
    name: String,
    device: RwLock<Device>,
    writer: tokio::sync::Mutex<Option<BoxWriter>>,
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

    async fn write(&self, bytes: &[u8]) -> Result<(), RemoteboxError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(RemoteboxError::Closed)?;
        send(writer, bytes).await
    }

    fn handle_line(&self, line: &str) {
        let outcome = parse_status(line)
            .and_then(|status| status.map_or(Ok(None), |status| self.apply(&status)));
        match outcome {
            Ok(Some(snapshot)) => self.bus.publish(snapshot),
            Ok(None) => {}
            Err(err) => tracing::warn!(device = %self.name, error = %err, "status line ignored"),
        }
    }

    /// Update the mirrored state; returns a snapshot when something changed.
    fn apply(&self, status: &Status) -> Result<Option<Device>, RemoteboxError> {
        let mut device = self.device.write().unwrap_or_else(PoisonError::into_inner);
        let port_name = match status {
            Status::Terminals { port, .. } | Status::Selected { port, .. } => port,
        };
        let port = device
            .ports
            .iter_mut()
            .find(|port| port.name == *port_name)
            .ok_or_else(|| RemoteboxError::Status(format!("unknown port {port_name}")))?;

        let changed = match status {
            Status::Terminals { states, .. } => {
                if states.len() != port.terminals.len() {
                    return Err(RemoteboxError::Status(format!(
                        "{port_name} reports {} terminals, model has {}",
                        states.len(),
                        port.terminals.len()
                    )));
                }
                let mut changed = false;
                for (terminal, state) in port.terminals.iter_mut().zip(states) {
                    if terminal.state != *state {
                        terminal.state = *state;
                        changed = true;
                    }
                }
                changed
            }
            Status::Selected { terminal, .. } => {
                let selected = terminal - 1;
                match port.terminals.get(selected) {
                    None => {
                        return Err(RemoteboxError::Status(format!(
                            "{port_name} has no terminal {terminal}"
                        )));
                    }
                    Some(current) if current.state => false,
                    Some(_) => {
                        for (position, terminal) in port.terminals.iter_mut().enumerate() {
                            terminal.state = position == selected;
                        }
                        true
                    }
                }
            }
        };
        Ok(changed.then(|| device.clone()))
    }
}

async fn run(
    shared: Arc<Shared>,
    mut reader: LineReader,
    poll: Duration,
    failure: oneshot::Sender<RemoteboxError>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_read = Instant::now();

    let outcome = loop {
        tokio::select! {
            () = shared.cancel.cancelled() => break Ok(()),
            line = reader.next() => match line {
                Ok(line) => {
                    last_read = Instant::now();
                    shared.handle_line(&line);
                }
                Err(err) => break Err(err),
            },
            _ = ticker.tick() => {
                if let Err(err) = shared.write(STATUS).await {
                    break Err(err);
                }
                if last_read.elapsed() > poll * WATCHDOG_FACTOR {
                    break Err(RemoteboxError::Watchdog);
                }
            }
        }
    };

    if let Err(err) = outcome {
        tracing::error!(device = %shared.name, error = %err, "remotebox failed, closing");
        shared.shutdown();
        if failure.send(err).is_err() {
            tracing::debug!(device = %shared.name, "remotebox failure not observed");
        }
    }
    let writer = shared.writer.lock().await.take();
    if let Some(mut writer) = writer {
        if let Err(err) = writer.shutdown().await {
            tracing::debug!(device = %shared.name, error = %err, "unable to shut down line");
        }
    }
    tracing::info!(device = %shared.name, "remotebox stopped");
}

/// An EA4TX Remotebox antenna switch.
pub struct Remotebox {
    shared: Arc<Shared>,
    model: Model,
    firmware: String,
}

impl Remotebox {
    /// Connect to the box described by `config`: TCP when an address is
    /// set, the serial device otherwise.
    ///
    /// # Errors
    ///
    /// Returns the connection or handshake failure.
    pub async fn open(
        config: &RemoteboxConfig,
        bus: StateBus,
    ) -> Result<(Self, Failure), RemoteboxError> {
        if let Some(address) = &config.address {
            let stream = TcpStream::connect(address.as_str())
                .await
                .map_err(|source| RemoteboxError::Connect {
                    address: address.clone(),
                    source,
                })?;
            Self::start(config, stream, bus).await
        } else {
            let stream = tokio_serial::new(&config.serial_port, config.baudrate)
                .open_native_async()
                .map_err(|source| RemoteboxError::Serial {
                    port: config.serial_port.clone(),
                    source,
                })?;
            Self::start(config, stream, bus).await
        }
    }

    /// Run the handshake over `io` and start polling.
    ///
    /// # Errors
    ///
    /// Returns the handshake failure; nothing keeps running in that case.
    #[tracing::instrument(skip_all, fields(device = %config.name))]
    pub async fn start<T>(
        config: &RemoteboxConfig,
        io: T,
        bus: StateBus,
    ) -> Result<(Self, Failure), RemoteboxError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(io);
        let mut reader = LineReader::new(Box::new(read));
        let mut writer: BoxWriter = Box::new(write);

        let (model, firmware) = identify(&mut reader, &mut writer).await?;
        let memory = read_configuration(&mut reader, &mut writer).await?;
        let ports = build_ports(model, &memory)?;
        tracing::info!(%model, %firmware, "remotebox found");

        let shared = Arc::new(Shared {
            name: config.name.clone(),
            device: RwLock::new(Device::new(config.name.clone(), config.index, ports)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            bus,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        let (failure_tx, failure_rx) = oneshot::channel();
        tokio::spawn(run(
            Arc::clone(&shared),
            reader,
            config.poll_interval(),
            failure_tx,
        ));

        Ok((
            Self {
                shared,
                model,
                firmware,
            },
            failure_rx,
        ))
    }

    #[must_use]
    pub fn model(&self) -> Model {
        self.model
    }

    #[must_use]
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// Select commands for the activations in `request`. Deactivations are
    /// dropped: the box only switches to another antenna.
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
            let terminal = port
                .terminal(&wanted.name)
                .ok_or_else(|| ValidationError::UnknownTerminal {
                    port: request.name.clone(),
                    terminal: wanted.name.clone(),
                })?;
            if wanted.state {
                commands.push(select_command(port.index, terminal.index));
            }
        }
        Ok(commands)
    }
}

impl SwitchDevice for Remotebox {
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
            return Err(TransportError::new("remotebox closed").into());
        }
        for command in self.commands(&request)? {
            tracing::debug!(command = command.trim_end(), "sending");
            self.shared
                .write(command.as_bytes())
                .await
                .map_err(RemoteboxError::into_domain)?;
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
            tracing::info!(device = %self.shared.name, "remotebox closed");
        }
    }
}

impl Drop for Remotebox {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
