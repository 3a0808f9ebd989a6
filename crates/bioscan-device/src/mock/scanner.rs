//! Mock capture scanner implementation for testing and development.
//!
//! [`MockScanner`] is a [`Transport`] that answers every command the way a
//! connected peripheral would: queries return the simulated identity and
//! settings, captures stream a few synthetic frames and store the final
//! image in a slot, and settings changes are remembered. Images are
//! fabricated byte patterns; nothing is actually measured or compressed.
//!
//! [`MockScannerHandle`] steers the simulation from the outside: it scripts
//! how `open` behaves, holds captures open until released, injects arbitrary
//! events, breaks the link and exposes the log of commands the scanner
//! received.

use crate::error::TransportError;
use crate::transport::{Transport, TransportResult};
use bioscan_core::{CaptureKind, CaptureStatus, ClearTarget, FrameShape, SlotIndex};
use bioscan_protocol::{Command, DeviceEvent, FrameImage};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// How [`MockScanner::open`](Transport::open) behaves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    /// Open immediately.
    #[default]
    Succeed,

    /// Fail with the given message.
    Fail(String),

    /// Never complete.
    Hang,

    /// Open after the given delay.
    Delay(Duration),
}

/// Item queued for the client side of the link.
#[derive(Debug)]
enum Outgoing {
    Event(DeviceEvent),
    Fail(String),
}

#[derive(Debug, Clone)]
struct SavedImage {
    image: FrameImage,
    nfiq: u8,
}

#[derive(Debug)]
struct MockState {
    connect: ConnectBehavior,
    open: bool,
    open_count: usize,
    sent: Vec<Command>,

    hold_captures: bool,
    preview_frames: usize,
    raw_frames: bool,
    held_fp: Option<(CaptureKind, SlotIndex)>,
    held_iris: bool,

    battery: u8,
    serial_number: String,
    model: String,
    firmware_version: String,
    description: String,
    led_brightness: u8,
    minimum_nfiq: u8,
    power_off_secs: u32,
    fp_power: bool,
    iris_power: bool,

    capture_nfiq: u8,
    duplicate_indicator: i32,
    firmware_result: i64,
    saved: BTreeMap<SlotIndex, SavedImage>,
}

impl MockState {
    fn new() -> Self {
        Self {
            connect: ConnectBehavior::Succeed,
            open: false,
            open_count: 0,
            sent: Vec::new(),
            hold_captures: false,
            preview_frames: 2,
            raw_frames: false,
            held_fp: None,
            held_iris: false,
            battery: 87,
            serial_number: "MOCK-0001".to_string(),
            model: "MockScan FAP45".to_string(),
            firmware_version: "1.0.0".to_string(),
            description: "Mock fingerprint and iris scanner".to_string(),
            led_brightness: 50,
            minimum_nfiq: 3,
            power_off_secs: 600,
            fp_power: true,
            iris_power: true,
            capture_nfiq: 2,
            duplicate_indicator: 0,
            firmware_result: 0,
            saved: BTreeMap::new(),
        }
    }

    /// Replies the device produces for `command`, in order.
    fn respond(&mut self, command: Command) -> Vec<DeviceEvent> {
        match command {
            Command::GetBatteryPercentage => vec![DeviceEvent::BatteryPercentage(self.battery)],
            Command::GetDeviceSerialNumber => {
                vec![DeviceEvent::SerialNumber(self.serial_number.clone())]
            }
            Command::GetFirmwareVersion => {
                vec![DeviceEvent::FirmwareVersion(self.firmware_version.clone())]
            }
            Command::GetModelNumber => vec![DeviceEvent::ModelNumber(self.model.clone())],
            Command::GetReaderDescription => {
                vec![DeviceEvent::ReaderDescription(self.description.clone())]
            }

            Command::StartFpCapture { kind, slot } => {
                if !self.fp_power {
                    return vec![DeviceEvent::FpCaptureStatus {
                        status: CaptureStatus::ERROR,
                        message: "Fingerprint sensor is powered off".to_string(),
                    }];
                }

                let mut events = vec![DeviceEvent::FpCaptureStatus {
                    status: CaptureStatus::STARTED,
                    message: String::new(),
                }];
                if self.hold_captures {
                    self.held_fp = Some((kind, slot));
                } else {
                    events.extend(self.finish_fp_capture(kind, slot));
                }
                events
            }
            Command::CancelFpCapture => {
                self.held_fp = None;
                vec![DeviceEvent::FpCaptureCancelled]
            }
            Command::StartIrisCapture => {
                if !self.iris_power {
                    return vec![DeviceEvent::IrisCaptureStatus {
                        status: CaptureStatus::ERROR,
                        message: "Iris sensor is powered off".to_string(),
                    }];
                }

                let mut events = vec![DeviceEvent::IrisCaptureStatus {
                    status: CaptureStatus::STARTED,
                    message: String::new(),
                }];
                if self.hold_captures {
                    self.held_iris = true;
                } else {
                    events.extend(Self::finish_iris_capture());
                }
                events
            }
            Command::CancelIrisCapture => {
                self.held_iris = false;
                vec![DeviceEvent::IrisCaptureCancelled]
            }

            Command::SetFpPower { on } => {
                self.fp_power = on;
                if on {
                    vec![DeviceEvent::FpPowerOn(true)]
                } else {
                    vec![DeviceEvent::FpPowerOff]
                }
            }
            Command::GetFpPowerStatus => vec![DeviceEvent::FpPowerStatus(self.fp_power)],
            Command::SetIrisPower { on } => {
                self.iris_power = on;
                if on {
                    vec![DeviceEvent::IrisPowerOn(true)]
                } else {
                    vec![DeviceEvent::IrisPowerOff]
                }
            }
            Command::GetIrisPowerStatus => vec![DeviceEvent::IrisPowerStatus(self.iris_power)],

            Command::SetLedBrightness(brightness) => {
                self.led_brightness = brightness.get();
                vec![DeviceEvent::LedBrightnessSet(self.led_brightness)]
            }
            Command::GetLedBrightness => vec![DeviceEvent::LedBrightness(self.led_brightness)],
            Command::SetMinimumNfiqScore(score) => {
                self.minimum_nfiq = score.get();
                vec![DeviceEvent::MinimumNfiqScoreSet(self.minimum_nfiq)]
            }
            Command::GetPowerOffMode => vec![DeviceEvent::PowerOffMode(self.power_off_secs)],
            Command::SetPowerOffMode(timeout) => {
                self.power_off_secs = timeout.as_secs();
                vec![DeviceEvent::PowerOffModeSet(self.power_off_secs)]
            }
            Command::SetLedControl(control) => vec![DeviceEvent::LedControlSet {
                power: control.power(),
                fp: control.fp(),
                com: control.com(),
                iris: control.iris(),
            }],

            Command::ClearSavedImages(target) => {
                match target {
                    ClearTarget::All => self.saved.clear(),
                    ClearTarget::Slot(slot) => {
                        self.saved.remove(&slot);
                    }
                }
                vec![DeviceEvent::SavedImagesCleared(target)]
            }
            Command::GetNfiqScore(slot) => vec![DeviceEvent::NfiqScore {
                score: self.saved.get(&slot).map_or(0, |saved| saved.nfiq),
                saved_at: slot,
            }],
            Command::GetSegmentedImage(slot) => vec![DeviceEvent::SegmentedImage {
                data: self
                    .saved
                    .get(&slot)
                    .map(|saved| saved.image.pixels.clone())
                    .unwrap_or_default(),
                saved_at: slot,
            }],
            Command::GetWsqImage { slot, cropped } => vec![DeviceEvent::WsqImage {
                data: self
                    .saved
                    .get(&slot)
                    .map(|saved| wsq_placeholder(&saved.image, cropped))
                    .unwrap_or_default(),
                saved_at: slot,
            }],
            Command::IsFingerDuplicated { .. } => vec![DeviceEvent::FingerDuplicated {
                indicator: self.duplicate_indicator,
            }],

            Command::StartFirmwareUpdate { .. } => vec![DeviceEvent::FirmwareTransferCompleted {
                result: self.firmware_result,
            }],

            other => {
                debug!("Mock scanner ignoring {}", other.name());
                Vec::new()
            }
        }
    }

    /// Preview frames plus the final frame; stores the image in `slot`.
    fn finish_fp_capture(&mut self, kind: CaptureKind, slot: SlotIndex) -> Vec<DeviceEvent> {
        let shape = kind.frame_shape().unwrap_or(FrameShape::Flat);
        let fingers = u32::from(kind.finger_count().unwrap_or(1));
        let seed = u8::try_from(slot.as_u32() % 256).unwrap_or_default();
        let image = synthetic_image(16 * fingers, 32, seed);

        let mut events = Vec::with_capacity(self.preview_frames + 1);
        for frame in 0..self.preview_frames {
            let event = match shape {
                FrameShape::Flat => DeviceEvent::Streaming {
                    image: image.clone(),
                },
                FrameShape::Rolled => {
                    let progress = (frame + 1) * image.width as usize / (self.preview_frames + 1);
                    DeviceEvent::StreamingRolled {
                        image: image.clone(),
                        rolling_state: i32::try_from(frame).unwrap_or(i32::MAX),
                        vertical_line_x: i32::try_from(progress).unwrap_or(i32::MAX),
                    }
                }
            };
            events.push(event);
        }

        events.push(DeviceEvent::LastFrame {
            shape,
            image: image.clone(),
            raw: self.raw_frames.then(|| image.pixels.clone()),
            saved_at: slot,
        });

        self.saved.insert(
            slot,
            SavedImage {
                image,
                nfiq: self.capture_nfiq,
            },
        );
        events
    }

    fn finish_iris_capture() -> Vec<DeviceEvent> {
        vec![
            DeviceEvent::IrisCaptureStatus {
                status: CaptureStatus::IN_PROGRESS,
                message: String::new(),
            },
            DeviceEvent::IrisCaptureStatus {
                status: CaptureStatus::COMPLETED,
                message: String::new(),
            },
        ]
    }
}

/// A gradient with a per-slot offset so images from different slots differ.
fn synthetic_image(width: u32, height: u32, seed: u8) -> FrameImage {
    let mut pixels = BytesMut::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.put_u8(((x + y) % 256) as u8 ^ seed);
        }
    }
    FrameImage::new(width, height, pixels.freeze())
}

/// Opaque stand-in for a WSQ file: the SOI marker followed by the pixels.
fn wsq_placeholder(image: &FrameImage, cropped: bool) -> Bytes {
    let pixels = if cropped {
        image.pixels.slice(..image.pixels.len() / 2)
    } else {
        image.pixels.clone()
    };

    let mut data = BytesMut::with_capacity(pixels.len() + 2);
    data.put_u16(0xffa0);
    data.extend_from_slice(&pixels);
    data.freeze()
}

/// Mock capture scanner for testing and development.
///
/// # Examples
///
/// ```
/// use bioscan_device::{Transport, mock::MockScanner};
/// use bioscan_core::{CaptureKind, SlotIndex};
/// use bioscan_protocol::{Command, DeviceEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), bioscan_device::TransportError> {
///     let (mut scanner, handle) = MockScanner::new();
///     scanner.open().await?;
///
///     scanner
///         .send(Command::StartFpCapture {
///             kind: CaptureKind::OneFinger,
///             slot: SlotIndex::new(0),
///         })
///         .await?;
///
///     // Started status, preview frames, then the last frame.
///     loop {
///         if let DeviceEvent::LastFrame { saved_at, .. } = scanner.recv().await? {
///             assert_eq!(saved_at, SlotIndex::new(0));
///             break;
///         }
///     }
///
///     assert_eq!(handle.sent_commands().len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockScanner {
    name: String,
    state: Arc<Mutex<MockState>>,
    events_tx: mpsc::UnboundedSender<Outgoing>,
    events_rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl MockScanner {
    /// Create a mock scanner with the default name.
    ///
    /// Returns the scanner and the handle that controls it.
    pub fn new() -> (Self, MockScannerHandle) {
        Self::with_name("Mock Scanner")
    }

    /// Create a mock scanner with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockScannerHandle) {
        let name = name.into();
        let state = Arc::new(Mutex::new(MockState::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handle = MockScannerHandle {
            name: name.clone(),
            state: Arc::clone(&state),
            events_tx: events_tx.clone(),
        };

        let scanner = Self {
            name,
            state,
            events_tx,
            events_rx,
        };

        (scanner, handle)
    }

    fn queue(&self, events: Vec<DeviceEvent>) {
        for event in events {
            trace!("[{}] Queueing {}", self.name, event.name());
            // The scanner holds a receiver, so the channel cannot be closed here.
            let _ = self.events_tx.send(Outgoing::Event(event));
        }
    }
}

impl Transport for MockScanner {
    async fn open(&mut self) -> TransportResult<()> {
        let behavior = self.state.lock().connect.clone();

        match behavior {
            ConnectBehavior::Succeed => {}
            ConnectBehavior::Fail(message) => {
                debug!("[{}] Refusing to open: {}", self.name, message);
                return Err(TransportError::link(message));
            }
            ConnectBehavior::Hang => std::future::pending::<()>().await,
            ConnectBehavior::Delay(delay) => tokio::time::sleep(delay).await,
        }

        // Anything queued while the link was down belongs to no session.
        while self.events_rx.try_recv().is_ok() {}

        let mut state = self.state.lock();
        state.open = true;
        state.open_count += 1;
        debug!("[{}] Opened", self.name);
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.held_fp = None;
        state.held_iris = false;
        debug!("[{}] Closed", self.name);
        Ok(())
    }

    async fn send(&mut self, command: Command) -> TransportResult<()> {
        let replies = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            trace!("[{}] Received {}", self.name, command);
            state.sent.push(command.clone());
            state.respond(command)
        };

        self.queue(replies);
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<DeviceEvent> {
        match self.events_rx.recv().await {
            Some(Outgoing::Event(event)) => Ok(event),
            Some(Outgoing::Fail(message)) => Err(TransportError::link(message)),
            None => Err(TransportError::Closed),
        }
    }

    fn describe(&self) -> String {
        format!("mock scanner \"{}\"", self.name)
    }
}

/// Handle for controlling a mock scanner.
///
/// Cloning the handle is cheap; all clones steer the same scanner.
///
/// # Examples
///
/// ```
/// use bioscan_device::mock::{ConnectBehavior, MockScanner};
///
/// let (_scanner, handle) = MockScanner::new();
/// handle.set_connect_behavior(ConnectBehavior::Fail("port busy".to_string()));
/// handle.set_battery(12);
/// handle.hold_captures(true);
/// assert!(handle.sent_commands().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockScannerHandle {
    name: String,
    state: Arc<Mutex<MockState>>,
    events_tx: mpsc::UnboundedSender<Outgoing>,
}

impl MockScannerHandle {
    /// Get the scanner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Script how the next `open` calls behave.
    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.state.lock().connect = behavior;
    }

    /// Whether the scanner is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Every command the scanner received, oldest first.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.state.lock().sent.clone()
    }

    /// Forget the received command log.
    pub fn clear_sent_commands(&self) {
        self.state.lock().sent.clear();
    }

    /// When set, captures stop after their started status until released.
    pub fn hold_captures(&self, hold: bool) {
        self.state.lock().hold_captures = hold;
    }

    /// Finish a held fingerprint capture. Returns `false` if none was held.
    pub fn release_fp_capture(&self) -> bool {
        let events = {
            let mut state = self.state.lock();
            match state.held_fp.take() {
                Some((kind, slot)) => state.finish_fp_capture(kind, slot),
                None => return false,
            }
        };
        self.send_events(events);
        true
    }

    /// Finish a held iris capture. Returns `false` if none was held.
    pub fn release_iris_capture(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !std::mem::take(&mut state.held_iris) {
                return false;
            }
        }
        self.send_events(MockState::finish_iris_capture());
        true
    }

    /// End a held fingerprint capture with a status instead of a last frame.
    pub fn fail_fp_capture(&self, status: CaptureStatus) -> bool {
        if self.state.lock().held_fp.take().is_none() {
            return false;
        }
        self.send_events(vec![DeviceEvent::FpCaptureStatus {
            status,
            message: String::new(),
        }]);
        true
    }

    /// Queue an arbitrary event as if the device had sent it.
    pub fn inject(&self, event: DeviceEvent) {
        self.send_events(vec![event]);
    }

    /// Make the next `recv` fail, as if the cable had been pulled.
    pub fn fail_link(&self, message: impl Into<String>) {
        let _ = self.events_tx.send(Outgoing::Fail(message.into()));
    }

    /// Number of preview frames streamed before each last frame.
    pub fn set_preview_frames(&self, frames: usize) {
        self.state.lock().preview_frames = frames;
    }

    /// Attach the raw sensor data to last frames.
    pub fn set_raw_frames(&self, raw: bool) {
        self.state.lock().raw_frames = raw;
    }

    pub fn set_battery(&self, percentage: u8) {
        self.state.lock().battery = percentage;
    }

    pub fn set_identity(
        &self,
        serial_number: impl Into<String>,
        model: impl Into<String>,
        firmware_version: impl Into<String>,
    ) {
        let mut state = self.state.lock();
        state.serial_number = serial_number.into();
        state.model = model.into();
        state.firmware_version = firmware_version.into();
    }

    /// NFIQ score recorded for images captured from now on.
    pub fn set_capture_nfiq(&self, score: u8) {
        self.state.lock().capture_nfiq = score;
    }

    pub fn set_duplicate_indicator(&self, indicator: i32) {
        self.state.lock().duplicate_indicator = indicator;
    }

    pub fn set_firmware_result(&self, result: i64) {
        self.state.lock().firmware_result = result;
    }

    pub fn led_brightness(&self) -> u8 {
        self.state.lock().led_brightness
    }

    pub fn minimum_nfiq(&self) -> u8 {
        self.state.lock().minimum_nfiq
    }

    pub fn power_off_secs(&self) -> u32 {
        self.state.lock().power_off_secs
    }

    pub fn fp_power(&self) -> bool {
        self.state.lock().fp_power
    }

    pub fn iris_power(&self) -> bool {
        self.state.lock().iris_power
    }

    /// Slots currently holding an image.
    pub fn saved_slots(&self) -> Vec<SlotIndex> {
        self.state.lock().saved.keys().copied().collect()
    }

    fn send_events(&self, events: Vec<DeviceEvent>) {
        for event in events {
            let _ = self.events_tx.send(Outgoing::Event(event));
        }
    }
}
