//! The device client.
//!
//! [`DeviceClient`] is the caller's single point of control for one capture
//! device. Every operation is synchronous and non-blocking: it is checked
//! against the session, and if it is allowed the matching command is queued
//! for the driver task. Results arrive later as [`ClientEvent`]s on the
//! registered observer.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────┐  Control (mpsc)  ┌──────────┐
//! caller ─────►│ DeviceClient │─────────────────►│  Driver  │◄────► Transport
//!              └──────┬───────┘                  └────┬─────┘
//!                     │ Session (Mutex)               │
//!                     └──────────────┬────────────────┘
//!                                    ▼ Dispatch (mpsc)
//!                              ┌────────────┐
//!                              │ Dispatcher │────► Observer / EventStream
//!                              └────────────┘
//! ```
//!
//! Errors returned directly by an operation are local decisions (wrong
//! state, nothing to cancel, bad argument, closed client); such an operation
//! never reaches the transport. Everything the device says, failures
//! included, arrives as an event.
//!
//! # Examples
//!
//! ```
//! use bioscan_device::{ClientConfig, ClientEvent, DeviceClient};
//! use bioscan_device::mock::MockScanner;
//! use bioscan_protocol::DeviceEvent;
//!
//! #[tokio::main]
//! async fn main() -> bioscan_device::Result<()> {
//!     let (scanner, _handle) = MockScanner::new();
//!     let client = DeviceClient::new(scanner, ClientConfig::default());
//!     let mut events = client.subscribe()?;
//!
//!     client.connect()?;
//!     assert_eq!(events.recv().await, Some(ClientEvent::Connected));
//!
//!     client.get_battery_percentage()?;
//!     let reply = events.recv().await;
//!     assert!(matches!(
//!         reply,
//!         Some(ClientEvent::Device(DeviceEvent::BatteryPercentage(_)))
//!     ));
//!
//!     client.disconnect()?;
//!     assert!(client.get_battery_percentage().is_err());
//!
//!     client.close_and_wait().await
//! }
//! ```

use crate::config::ClientConfig;
use crate::dispatcher::{self, Dispatch, EventStream, Observer, Sink};
use crate::driver::{Control, Driver};
use crate::error::{ClientError, Result, require_state};
use crate::event::ClientEvent;
use crate::session::{CaptureRequest, ConnectionState, Session, TransitionRecord};
use crate::transport::Transport;
use bioscan_core::{
    CaptureKind, ClearTarget, DeviceIdentity, LedBrightness, LedControl, Modality, NfiqScore,
    PowerOffTimeout, SecurityLevel, SlotIndex,
};
use bioscan_protocol::{Command, DeviceEvent};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// State shared between the client and its driver task.
pub(crate) struct Shared {
    pub(crate) label: String,
    pub(crate) session: Mutex<Session>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
}

impl Shared {
    /// Queue an event for the observer. Called with the session lock held
    /// whenever the event depends on session bookkeeping.
    pub(crate) fn emit(&self, event: ClientEvent) {
        trace!("[{}] Emitting {}", self.label, event.name());
        if self.dispatch_tx.send(Dispatch::Event(event)).is_err() {
            debug!("[{}] Dispatcher gone, event dropped", self.label);
        }
    }

    fn register(&self, sink: Option<Sink>) {
        let message = match sink {
            Some(sink) => Dispatch::Register(sink),
            None => Dispatch::Unregister,
        };
        let _ = self.dispatch_tx.send(message);
    }

    pub(crate) fn shutdown_dispatcher(&self) {
        let _ = self.dispatch_tx.send(Dispatch::Shutdown);
    }
}

/// Client for one biometric capture device.
///
/// Construct it inside a Tokio runtime: [`DeviceClient::new`] spawns the
/// driver and dispatcher tasks. Dropping the client shuts both down once
/// they have drained their queues; [`DeviceClient::close_and_wait`] does the
/// same and waits for it.
pub struct DeviceClient {
    shared: Arc<Shared>,
    control_tx: mpsc::UnboundedSender<Control>,
    tasks: Mutex<Option<JoinSet<()>>>,
    config: ClientConfig,
    transport: String,
}

impl DeviceClient {
    /// Create a client that talks to the device through `transport`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new<T: Transport>(transport: T, config: ClientConfig) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let description = transport.describe();

        let shared = Arc::new(Shared {
            label: config.label.clone(),
            session: Mutex::new(Session::new(config.history_limit)),
            dispatch_tx,
        });

        let mut tasks = JoinSet::new();
        tasks.spawn(dispatcher::run(config.label.clone(), dispatch_rx));
        tasks.spawn(
            Driver::new(
                transport,
                Arc::clone(&shared),
                control_rx,
                config.connect_timeout(),
            )
            .run(),
        );

        debug!("[{}] Client created for {}", config.label, description);

        Self {
            shared,
            control_tx,
            tasks: Mutex::new(Some(tasks)),
            config,
            transport: description,
        }
    }

    /// Version of this library. Needs no session and works after `close`.
    pub fn library_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Description of the transport, as given when the client was created.
    pub fn transport_description(&self) -> &str {
        &self.transport
    }

    // Observer registration

    /// Register `observer`, replacing any previous observer or stream.
    ///
    /// Only a weak reference is kept: once the caller drops its last `Arc`,
    /// delivery stops. Events queued before this call are not delivered to
    /// the new observer.
    pub fn set_observer<O: Observer + 'static>(&self, observer: &Arc<O>) -> Result<()> {
        // Held so registration is ordered against events emitted under the lock.
        let session = self.lock_open()?;
        let weak = Arc::downgrade(observer) as Weak<dyn Observer>;
        self.shared.register(Some(Sink::Observer(weak)));
        drop(session);
        Ok(())
    }

    /// Stop delivering events. Events queued before this call still arrive.
    pub fn clear_observer(&self) -> Result<()> {
        let session = self.lock_open()?;
        self.shared.register(None);
        drop(session);
        Ok(())
    }

    /// Receive events through a stream instead of an observer.
    ///
    /// Replaces any previous observer or stream.
    pub fn subscribe(&self) -> Result<EventStream> {
        let session = self.lock_open()?;
        let (sink, stream) = Sink::stream();
        self.shared.register(Some(sink));
        drop(session);
        Ok(stream)
    }

    // Connection lifecycle

    /// Start connecting. The outcome arrives as `Connected`,
    /// `ConnectionError` or `ConnectionTimeout`.
    ///
    /// # Errors
    ///
    /// `AlreadyConnecting` while an attempt is in progress, `InvalidState`
    /// unless disconnected.
    pub fn connect(&self) -> Result<()> {
        let mut session = self.lock_open()?;
        match session.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => return Err(ClientError::AlreadyConnecting),
            state => return Err(ClientError::invalid_state("connect", state)),
        }

        session.transition_to(ConnectionState::Connecting);
        let epoch = session.bump_epoch();
        info!("[{}] Connecting to {}", self.shared.label, self.transport);
        self.queue(Control::Connect { epoch });
        Ok(())
    }

    /// Drop the connection.
    ///
    /// Takes effect immediately: active captures each get a synthetic cancel
    /// event, then `Disconnected` is emitted. The transport is closed in the
    /// background.
    pub fn disconnect(&self) -> Result<()> {
        let mut session = self.lock_open()?;
        match session.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {}
            state => return Err(ClientError::invalid_state("disconnect", state)),
        }

        self.tear_down(&mut session);
        Ok(())
    }

    /// Shut the client down for good.
    ///
    /// Disconnects first if needed. The observer is released after the final
    /// events have been delivered. Every later operation fails with
    /// `NotInitialized`.
    pub fn close(&self) -> Result<()> {
        let mut session = self.lock_open()?;
        if matches!(
            session.state(),
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            self.tear_down(&mut session);
        }

        session.mark_closed();
        self.queue(Control::Shutdown);
        info!("[{}] Client closed", self.shared.label);
        Ok(())
    }

    /// [`close`](Self::close), then wait for the background tasks to finish.
    pub async fn close_and_wait(&self) -> Result<()> {
        self.close()?;

        let tasks = self.tasks.lock().take();
        if let Some(mut tasks) = tasks {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result
                    && e.is_panic()
                {
                    warn!("[{}] Background task panicked: {}", self.shared.label, e);
                }
            }
        }
        Ok(())
    }

    // Device information

    pub fn get_battery_percentage(&self) -> Result<()> {
        self.submit("get battery percentage", Command::GetBatteryPercentage)
    }

    pub fn get_device_serial_number(&self) -> Result<()> {
        self.submit("get serial number", Command::GetDeviceSerialNumber)
    }

    pub fn get_firmware_version(&self) -> Result<()> {
        self.submit("get firmware version", Command::GetFirmwareVersion)
    }

    pub fn get_model_number(&self) -> Result<()> {
        self.submit("get model number", Command::GetModelNumber)
    }

    pub fn get_reader_description(&self) -> Result<()> {
        self.submit("get reader description", Command::GetReaderDescription)
    }

    // Capture

    /// Capture one flat finger and store it in `slot`.
    pub fn start_capture_one_finger(&self, slot: SlotIndex) -> Result<()> {
        self.start_fp_capture(CaptureKind::OneFinger, slot)
    }

    /// Capture two flat fingers and store them in `slot`.
    pub fn start_capture_two_finger(&self, slot: SlotIndex) -> Result<()> {
        self.start_fp_capture(CaptureKind::TwoFinger, slot)
    }

    /// Capture four flat fingers and store them in `slot`.
    pub fn start_capture_four_finger(&self, slot: SlotIndex) -> Result<()> {
        self.start_fp_capture(CaptureKind::FourFinger, slot)
    }

    /// Capture a rolled finger and store it in `slot`.
    pub fn start_capture_roll_finger(&self, slot: SlotIndex) -> Result<()> {
        self.start_fp_capture(CaptureKind::RolledFinger, slot)
    }

    pub fn start_capture_iris(&self) -> Result<()> {
        let operation = "start iris capture";
        let mut session = self.lock_connected(operation)?;
        Self::ensure_idle(&session, Modality::Iris, operation)?;

        let id = session.begin_capture(CaptureKind::Iris, None);
        debug!("[{}] Starting iris capture {}", self.shared.label, id);
        self.enqueue(&session, Command::StartIrisCapture);
        Ok(())
    }

    /// Ask the device to stop the fingerprint capture.
    ///
    /// The capture stays active until the device acknowledges. Repeating the
    /// call before that is a no-op.
    ///
    /// # Errors
    ///
    /// `NoActiveCapture` when no fingerprint capture is running.
    pub fn cancel_fp_capture(&self) -> Result<()> {
        self.cancel_capture(Modality::Fingerprint)
    }

    /// Ask the device to stop the iris capture.
    pub fn cancel_iris_capture(&self) -> Result<()> {
        self.cancel_capture(Modality::Iris)
    }

    // Power management

    pub fn set_fp_power_on(&self) -> Result<()> {
        self.set_power(Modality::Fingerprint, true)
    }

    /// Power the fingerprint sensor off. Rejected while it is capturing.
    pub fn set_fp_power_off(&self) -> Result<()> {
        self.set_power(Modality::Fingerprint, false)
    }

    pub fn get_fp_power_status(&self) -> Result<()> {
        self.submit("get fingerprint power status", Command::GetFpPowerStatus)
    }

    pub fn set_iris_power_on(&self) -> Result<()> {
        self.set_power(Modality::Iris, true)
    }

    /// Power the iris sensor off. Rejected while it is capturing.
    pub fn set_iris_power_off(&self) -> Result<()> {
        self.set_power(Modality::Iris, false)
    }

    pub fn get_iris_power_status(&self) -> Result<()> {
        self.submit("get iris power status", Command::GetIrisPowerStatus)
    }

    // Settings

    pub fn set_led_brightness(&self, brightness: LedBrightness) -> Result<()> {
        self.submit("set LED brightness", Command::SetLedBrightness(brightness))
    }

    pub fn get_led_brightness(&self) -> Result<()> {
        self.submit("get LED brightness", Command::GetLedBrightness)
    }

    /// The device offers no matching getter.
    pub fn set_minimum_nfiq_score(&self, score: NfiqScore) -> Result<()> {
        self.submit("set minimum NFIQ score", Command::SetMinimumNfiqScore(score))
    }

    pub fn get_power_off_mode(&self) -> Result<()> {
        self.submit("get power-off mode", Command::GetPowerOffMode)
    }

    pub fn set_power_off_mode(&self, timeout: PowerOffTimeout) -> Result<()> {
        self.submit("set power-off mode", Command::SetPowerOffMode(timeout))
    }

    pub fn set_led_control(&self, control: LedControl) -> Result<()> {
        self.submit("set LED control", Command::SetLedControl(control))
    }

    // Saved images

    pub fn clear_saved_images(&self, target: ClearTarget) -> Result<()> {
        self.submit("clear saved images", Command::ClearSavedImages(target))
    }

    pub fn get_nfiq_score(&self, slot: SlotIndex) -> Result<()> {
        self.submit("get NFIQ score", Command::GetNfiqScore(slot))
    }

    pub fn get_segmented_image(&self, slot: SlotIndex) -> Result<()> {
        self.submit("get segmented image", Command::GetSegmentedImage(slot))
    }

    pub fn get_wsq_image(&self, slot: SlotIndex, cropped: bool) -> Result<()> {
        self.submit("get WSQ image", Command::GetWsqImage { slot, cropped })
    }

    /// Check the finger in `slot` against the others held by the device.
    pub fn is_finger_duplicated(&self, slot: SlotIndex, security_level: SecurityLevel) -> Result<()> {
        self.submit(
            "check finger duplication",
            Command::IsFingerDuplicated {
                slot,
                security_level,
            },
        )
    }

    // Firmware

    /// Send a firmware image. One `FirmwareTransferCompleted` event reports
    /// the result; there are no progress events.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty image, `InvalidState` while another
    /// transfer is in flight.
    pub fn start_firmware_update(&self, image: impl Into<Bytes>, legacy: bool) -> Result<()> {
        let operation = "start firmware update";
        let image = image.into();
        let mut session = self.lock_connected(operation)?;

        if image.is_empty() {
            return Err(bioscan_core::Error::EmptyFirmware.into());
        }
        if session.firmware_in_flight() {
            return Err(ClientError::invalid_state(
                operation,
                "a firmware transfer is in flight",
            ));
        }

        info!(
            "[{}] Starting firmware update ({} bytes, legacy: {})",
            self.shared.label,
            image.len(),
            legacy
        );
        session.set_firmware_in_flight(true);
        self.enqueue(&session, Command::StartFirmwareUpdate { image, legacy });
        Ok(())
    }

    // Introspection

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.session.lock().state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.session.lock().is_closed()
    }

    pub fn is_fp_capturing(&self) -> bool {
        self.active_capture(Modality::Fingerprint).is_some()
    }

    pub fn is_iris_capturing(&self) -> bool {
        self.active_capture(Modality::Iris).is_some()
    }

    /// Snapshot of the capture running on `modality`.
    pub fn active_capture(&self, modality: Modality) -> Option<CaptureRequest> {
        self.shared.session.lock().capture(modality).cloned()
    }

    /// Identity reported by the device so far.
    pub fn device_identity(&self) -> DeviceIdentity {
        self.shared.session.lock().identity().clone()
    }

    /// Recent connection state changes, oldest first.
    pub fn transition_history(&self) -> Vec<TransitionRecord> {
        self.shared.session.lock().history().iter().cloned().collect()
    }

    // Internals

    fn lock_open(&self) -> Result<MutexGuard<'_, Session>> {
        let session = self.shared.session.lock();
        if session.is_closed() {
            return Err(ClientError::NotInitialized);
        }
        Ok(session)
    }

    fn lock_connected(&self, operation: &'static str) -> Result<MutexGuard<'_, Session>> {
        let session = self.lock_open()?;
        require_state(operation, session.state(), ConnectionState::Connected)?;
        Ok(session)
    }

    fn ensure_idle(session: &Session, modality: Modality, operation: &'static str) -> Result<()> {
        if session.capture(modality).is_some() {
            return Err(ClientError::invalid_state(
                operation,
                format!("a {modality} capture is active"),
            ));
        }
        Ok(())
    }

    fn submit(&self, operation: &'static str, command: Command) -> Result<()> {
        let session = self.lock_connected(operation)?;
        self.enqueue(&session, command);
        Ok(())
    }

    fn start_fp_capture(&self, kind: CaptureKind, slot: SlotIndex) -> Result<()> {
        let operation = "start fingerprint capture";
        let mut session = self.lock_connected(operation)?;
        Self::ensure_idle(&session, Modality::Fingerprint, operation)?;

        let id = session.begin_capture(kind, Some(slot));
        debug!(
            "[{}] Starting {:?} capture {} into slot {}",
            self.shared.label, kind, id, slot
        );
        self.enqueue(&session, Command::StartFpCapture { kind, slot });
        Ok(())
    }

    fn cancel_capture(&self, modality: Modality) -> Result<()> {
        let operation = match modality {
            Modality::Fingerprint => "cancel fingerprint capture",
            Modality::Iris => "cancel iris capture",
        };
        let mut session = self.lock_connected(operation)?;

        let Some(capture) = session.capture_mut(modality) else {
            return Err(ClientError::NoActiveCapture { modality });
        };
        if capture.cancel_requested {
            debug!("[{}] Cancel of capture {} already sent", self.shared.label, capture.id);
            return Ok(());
        }
        capture.cancel_requested = true;

        let command = match modality {
            Modality::Fingerprint => Command::CancelFpCapture,
            Modality::Iris => Command::CancelIrisCapture,
        };
        self.enqueue(&session, command);
        Ok(())
    }

    fn set_power(&self, modality: Modality, on: bool) -> Result<()> {
        let operation = match (modality, on) {
            (Modality::Fingerprint, true) => "power on fingerprint sensor",
            (Modality::Fingerprint, false) => "power off fingerprint sensor",
            (Modality::Iris, true) => "power on iris sensor",
            (Modality::Iris, false) => "power off iris sensor",
        };
        let session = self.lock_connected(operation)?;
        if !on {
            Self::ensure_idle(&session, modality, operation)?;
        }

        let command = match modality {
            Modality::Fingerprint => Command::SetFpPower { on },
            Modality::Iris => Command::SetIrisPower { on },
        };
        self.enqueue(&session, command);
        Ok(())
    }

    /// Local half of a disconnect. Runs under the session lock.
    fn tear_down(&self, session: &mut Session) {
        session.bump_epoch();
        for capture in session.reset_link() {
            debug!(
                "[{}] Capture {} cut short by disconnect",
                self.shared.label, capture.id
            );
            self.shared
                .emit(ClientEvent::Device(DeviceEvent::cancelled(capture.modality())));
        }

        session.transition_to(ConnectionState::Disconnected);
        self.shared.emit(ClientEvent::Disconnected);
        self.queue(Control::Disconnect);
        info!("[{}] Disconnected from {}", self.shared.label, self.transport);
    }

    /// Queue a command for the current link. Called with the session lock
    /// held so the epoch matches the state the command was checked against.
    fn enqueue(&self, session: &Session, command: Command) {
        trace!("[{}] Queueing {}", self.shared.label, command);
        self.queue(Control::Send {
            epoch: session.epoch(),
            command,
        });
    }

    fn queue(&self, control: Control) {
        if self.control_tx.send(control).is_err() {
            warn!("[{}] Driver task is gone", self.shared.label);
        }
    }
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("label", &self.shared.label)
            .field("transport", &self.transport)
            .field("state", &self.connection_state())
            .finish()
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(mut tasks) = self.tasks.get_mut().take() {
            // Let the tasks drain their queues instead of aborting them.
            tasks.detach_all();
        }
    }
}
