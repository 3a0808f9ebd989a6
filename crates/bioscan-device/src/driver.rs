//! Background task that owns the transport.
//!
//! The driver executes queued [`Control`]s in order. While a link is up it
//! also waits on the transport for device events; while the transport is
//! opening it keeps listening for controls so a disconnect or shutdown can
//! abandon the attempt.
//!
//! Every connection attempt carries the session epoch it was started under.
//! The driver remembers the epoch of the link it holds and drops anything
//! (results, events, queued commands) that belongs to an older one.

use crate::client::Shared;
use crate::event::ClientEvent;
use crate::session::ConnectionState;
use crate::transport::{Transport, TransportResult};
use bioscan_core::Modality;
use bioscan_core::constants::FIRMWARE_RESULT_NOT_SENT;
use bioscan_protocol::{Command, DeviceEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;
use tracing::{debug, info, trace, warn};

/// Work queued for the driver by the client.
#[derive(Debug)]
pub(crate) enum Control {
    Connect { epoch: u64 },
    Disconnect,
    Send { epoch: u64, command: Command },
    Shutdown,
}

enum Wake {
    Control(Option<Control>),
    Event(TransportResult<DeviceEvent>),
}

/// Session bookkeeping a command leaves open until the device answers.
enum PendingReply {
    Capture(Modality),
    Firmware,
    Plain,
}

impl PendingReply {
    fn of(command: &Command) -> Self {
        match command {
            Command::StartFpCapture { .. } => Self::Capture(Modality::Fingerprint),
            Command::StartIrisCapture => Self::Capture(Modality::Iris),
            Command::StartFirmwareUpdate { .. } => Self::Firmware,
            _ => Self::Plain,
        }
    }
}

enum Opening {
    Interrupted(Option<Control>),
    Finished(Result<TransportResult<()>, Elapsed>),
}

pub(crate) struct Driver<T: Transport> {
    transport: T,
    shared: Arc<Shared>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    connect_timeout: Duration,
    /// Epoch of the open link, if any.
    link: Option<u64>,
}

impl<T: Transport> Driver<T> {
    pub(crate) fn new(
        transport: T,
        shared: Arc<Shared>,
        control_rx: mpsc::UnboundedReceiver<Control>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            shared,
            control_rx,
            connect_timeout,
            link: None,
        }
    }

    /// Run until shutdown or until the client is gone.
    pub(crate) async fn run(mut self) {
        let mut pending: Option<Control> = None;

        loop {
            let control = match pending.take() {
                Some(control) => control,
                None => match self.wait().await {
                    Wake::Control(Some(control)) => control,
                    Wake::Control(None) => break,
                    Wake::Event(result) => {
                        self.on_receive(result).await;
                        continue;
                    }
                },
            };

            match control {
                Control::Connect { epoch } => pending = self.connect(epoch).await,
                Control::Disconnect => self.disconnect().await,
                Control::Send { epoch, command } => self.send(epoch, command).await,
                Control::Shutdown => break,
            }
        }

        self.shutdown().await;
    }

    async fn wait(&mut self) -> Wake {
        if self.link.is_none() {
            return Wake::Control(self.control_rx.recv().await);
        }

        tokio::select! {
            biased;
            control = self.control_rx.recv() => Wake::Control(control),
            result = self.transport.recv() => Wake::Event(result),
        }
    }

    /// Open the transport for `epoch`. Returns a control that interrupted the
    /// attempt, to be processed next.
    async fn connect(&mut self, epoch: u64) -> Option<Control> {
        let current = self.shared.session.lock().epoch();
        if current != epoch {
            debug!("[{}] Skipping stale connect request", self.shared.label);
            return None;
        }

        if self.link.take().is_some() {
            self.close_transport().await;
        }

        debug!(
            "[{}] Opening {} (timeout {}ms)",
            self.shared.label,
            self.transport.describe(),
            self.connect_timeout.as_millis()
        );

        let timeout = self.connect_timeout;
        let outcome = tokio::select! {
            biased;
            control = self.control_rx.recv() => Opening::Interrupted(control),
            result = tokio::time::timeout(timeout, self.transport.open()) => Opening::Finished(result),
        };

        match outcome {
            Opening::Interrupted(control) => {
                debug!("[{}] Open abandoned", self.shared.label);
                self.close_transport().await;
                Some(control.unwrap_or(Control::Shutdown))
            }
            Opening::Finished(Ok(Ok(()))) => {
                self.opened(epoch).await;
                None
            }
            Opening::Finished(Ok(Err(e))) => {
                self.open_failed(epoch, e.to_string()).await;
                None
            }
            Opening::Finished(Err(_)) => {
                self.open_timed_out(epoch).await;
                None
            }
        }
    }

    async fn opened(&mut self, epoch: u64) {
        let accepted = {
            let mut session = self.shared.session.lock();
            if session.epoch() == epoch && session.state() == ConnectionState::Connecting {
                session.transition_to(ConnectionState::Connected);
                self.shared.emit(ClientEvent::Connected);
                true
            } else {
                false
            }
        };

        if accepted {
            info!("[{}] Connected to {}", self.shared.label, self.transport.describe());
            self.link = Some(epoch);
        } else {
            debug!("[{}] Closing link opened for a stale attempt", self.shared.label);
            self.close_transport().await;
        }
    }

    async fn open_failed(&mut self, epoch: u64, message: String) {
        let current = {
            let mut session = self.shared.session.lock();
            let current = session.epoch() == epoch && session.state() == ConnectionState::Connecting;
            if current {
                session.transition_to(ConnectionState::Error);
            }
            current
        };

        if !current {
            debug!("[{}] Ignoring failure of a stale attempt: {}", self.shared.label, message);
            return;
        }

        warn!("[{}] Failed to open {}: {}", self.shared.label, self.transport.describe(), message);
        self.close_transport().await;

        let mut session = self.shared.session.lock();
        if session.state() == ConnectionState::Error {
            session.transition_to(ConnectionState::Disconnected);
            self.shared.emit(ClientEvent::ConnectionError { message });
        }
    }

    async fn open_timed_out(&mut self, epoch: u64) {
        let duration_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        warn!("[{}] Connection timeout after {}ms", self.shared.label, duration_ms);

        self.close_transport().await;

        let mut session = self.shared.session.lock();
        if session.epoch() == epoch && session.state() == ConnectionState::Connecting {
            session.transition_to(ConnectionState::Disconnected);
            self.shared.emit(ClientEvent::ConnectionTimeout { duration_ms });
        }
    }

    async fn disconnect(&mut self) {
        // The session side was settled by the caller.
        self.link = None;
        self.close_transport().await;
        debug!("[{}] Link closed on request", self.shared.label);
    }

    async fn send(&mut self, epoch: u64, command: Command) {
        if self.link != Some(epoch) {
            debug!("[{}] Dropping {} queued for a closed link", self.shared.label, command.name());
            return;
        }

        trace!("[{}] Sending {}", self.shared.label, command);
        let name = command.name();
        let pending = PendingReply::of(&command);
        match self.transport.send(command).await {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => self.not_sent(name, pending, e.to_string()),
            Err(e) => self.link_failed(e.to_string()).await,
        }
    }

    /// Settle a command that never left the client. The link stays up; a
    /// command that opened a capture or a firmware transfer gets its
    /// terminal event so the session does not wait forever.
    fn not_sent(&self, name: &'static str, pending: PendingReply, message: String) {
        warn!("[{}] {} not sent: {}", self.shared.label, name, message);

        let mut session = self.shared.session.lock();
        if self.link != Some(session.epoch()) {
            return;
        }

        match pending {
            PendingReply::Capture(modality) => {
                if session.take_capture(modality).is_some() {
                    self.shared
                        .emit(ClientEvent::Device(DeviceEvent::cancelled(modality)));
                }
            }
            PendingReply::Firmware => {
                if session.firmware_in_flight() {
                    session.set_firmware_in_flight(false);
                    self.shared.emit(ClientEvent::Device(
                        DeviceEvent::FirmwareTransferCompleted {
                            result: FIRMWARE_RESULT_NOT_SENT,
                        },
                    ));
                }
            }
            PendingReply::Plain => {}
        }
    }

    async fn on_receive(&mut self, result: TransportResult<DeviceEvent>) {
        match result {
            Ok(event) => self.deliver(event),
            Err(e) => self.link_failed(e.to_string()).await,
        }
    }

    /// Apply a device event to the session and forward it.
    fn deliver(&self, event: DeviceEvent) {
        let mut session = self.shared.session.lock();
        if self.link != Some(session.epoch()) {
            trace!("[{}] Dropping {} from a closed link", self.shared.label, event.name());
            return;
        }

        if let Some(modality) = event.capture_modality() {
            if session.capture(modality).is_none() {
                debug!(
                    "[{}] Dropping {} with no active {} capture",
                    self.shared.label,
                    event.name(),
                    modality
                );
                return;
            }

            if event.is_terminal_for(modality)
                && let Some(capture) = session.take_capture(modality)
            {
                debug!(
                    "[{}] Capture {} ({:?}) ended with {}",
                    self.shared.label,
                    capture.id,
                    capture.kind,
                    event.name()
                );
            }
        }

        match &event {
            DeviceEvent::SerialNumber(serial) => {
                session.identity_mut().serial_number = Some(serial.clone());
            }
            DeviceEvent::ModelNumber(model) => {
                session.identity_mut().model = Some(model.clone());
            }
            DeviceEvent::FirmwareVersion(version) => {
                session.identity_mut().firmware_version = Some(version.clone());
            }
            DeviceEvent::FirmwareTransferCompleted { result } => {
                info!("[{}] Firmware transfer completed with result {}", self.shared.label, result);
                session.set_firmware_in_flight(false);
            }
            _ => {}
        }

        self.shared.emit(ClientEvent::Device(event));
    }

    /// Tear down after the link broke underneath a connected session.
    async fn link_failed(&mut self, message: String) {
        let current = {
            let mut session = self.shared.session.lock();
            let current =
                self.link == Some(session.epoch()) && session.state() == ConnectionState::Connected;
            if current {
                session.transition_to(ConnectionState::Error);
                session.bump_epoch();
                for capture in session.reset_link() {
                    self.shared
                        .emit(ClientEvent::Device(DeviceEvent::cancelled(capture.modality())));
                }
            }
            current
        };

        self.link = None;
        self.close_transport().await;

        if !current {
            debug!("[{}] Stale link failed: {}", self.shared.label, message);
            return;
        }

        warn!("[{}] Link to {} failed: {}", self.shared.label, self.transport.describe(), message);

        let mut session = self.shared.session.lock();
        if session.state() == ConnectionState::Error {
            session.transition_to(ConnectionState::Disconnected);
            self.shared.emit(ClientEvent::ConnectionError { message });
        }
    }

    async fn close_transport(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!("[{}] Error closing {}: {}", self.shared.label, self.transport.describe(), e);
        }
    }

    async fn shutdown(&mut self) {
        if self.link.take().is_some() {
            self.close_transport().await;
        }
        self.shared.shutdown_dispatcher();
        debug!("[{}] Driver stopped", self.shared.label);
    }
}
