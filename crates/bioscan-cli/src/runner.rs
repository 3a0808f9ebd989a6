//! One-shot command runner.
//!
//! Wraps a [`DeviceClient`] and its event stream, turning the
//! fire-and-forget API into request/reply steps with a deadline.

use anyhow::{Context, Result, anyhow, bail};
use bioscan_core::{CaptureKind, CaptureStatus, Modality, SlotIndex};
use bioscan_device::{ClientEvent, DeviceClient, EventStream};
use bioscan_protocol::DeviceEvent;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a completed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub kind: CaptureKind,
    pub saved_at: Option<SlotIndex>,
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    pub nfiq: Option<u8>,
    pub wsq_bytes: Option<usize>,
}

pub struct Runner {
    client: DeviceClient,
    events: EventStream,
    reply_timeout: Duration,
}

impl Runner {
    pub fn new(client: DeviceClient, reply_timeout: Duration) -> Result<Self> {
        let events = client.subscribe()?;
        Ok(Self {
            client,
            events,
            reply_timeout,
        })
    }

    #[cfg(test)]
    fn client(&self) -> &DeviceClient {
        &self.client
    }

    /// Connect and wait for the link to come up.
    pub async fn connect(&mut self) -> Result<()> {
        self.client.connect()?;
        loop {
            let event = self.next().await?;
            if let Some(error) = event.as_error() {
                return Err(error).with_context(|| {
                    format!("Failed to connect via {}", self.client.transport_description())
                });
            }
            if event == ClientEvent::Connected {
                info!("Connected via {}", self.client.transport_description());
                return Ok(());
            }
            debug!("Ignoring {} while connecting", event.name());
        }
    }

    /// Query the device information the client exposes.
    pub async fn info(&mut self) -> Result<Vec<DeviceEvent>> {
        self.client.get_battery_percentage()?;
        self.client.get_device_serial_number()?;
        self.client.get_model_number()?;
        self.client.get_firmware_version()?;
        self.client.get_reader_description()?;

        let mut replies = Vec::with_capacity(5);
        while replies.len() < 5 {
            let reply = self
                .reply(|event| match event {
                    DeviceEvent::BatteryPercentage(_)
                    | DeviceEvent::SerialNumber(_)
                    | DeviceEvent::ModelNumber(_)
                    | DeviceEvent::FirmwareVersion(_)
                    | DeviceEvent::ReaderDescription(_) => Some(event.clone()),
                    _ => None,
                })
                .await?;
            replies.push(reply);
        }
        Ok(replies)
    }

    /// Run one capture to completion.
    ///
    /// For fingerprint captures the NFIQ score of the saved slot is fetched
    /// afterwards, and the WSQ image too when `wsq` is set.
    pub async fn capture(
        &mut self,
        kind: CaptureKind,
        slot: SlotIndex,
        wsq: bool,
    ) -> Result<CaptureOutcome> {
        match kind {
            CaptureKind::OneFinger => self.client.start_capture_one_finger(slot)?,
            CaptureKind::TwoFinger => self.client.start_capture_two_finger(slot)?,
            CaptureKind::FourFinger => self.client.start_capture_four_finger(slot)?,
            CaptureKind::RolledFinger => self.client.start_capture_roll_finger(slot)?,
            CaptureKind::Iris => self.client.start_capture_iris()?,
        }

        let modality = kind.modality();
        let mut outcome = CaptureOutcome {
            kind,
            saved_at: None,
            width: 0,
            height: 0,
            frames: 0,
            nfiq: None,
            wsq_bytes: None,
        };

        loop {
            let event = self.next_device_event().await?;
            debug!("{}", describe_device(&event));

            match &event {
                DeviceEvent::Streaming { .. } | DeviceEvent::StreamingRolled { .. } => {
                    outcome.frames += 1;
                }
                DeviceEvent::LastFrame {
                    image, saved_at, ..
                } => {
                    outcome.frames += 1;
                    outcome.width = image.width;
                    outcome.height = image.height;
                    outcome.saved_at = Some(*saved_at);
                }
                _ => {}
            }

            if event.is_terminal_for(modality) {
                if event == DeviceEvent::cancelled(modality) {
                    bail!("{modality} capture was cancelled");
                }
                break;
            }
        }

        if modality == Modality::Iris {
            return Ok(outcome);
        }

        let saved_at = outcome.saved_at.unwrap_or(slot);
        self.client.get_nfiq_score(saved_at)?;
        outcome.nfiq = Some(
            self.reply(|event| match event {
                DeviceEvent::NfiqScore { score, .. } => Some(*score),
                _ => None,
            })
            .await?,
        );

        if wsq {
            self.client.get_wsq_image(saved_at, false)?;
            outcome.wsq_bytes = Some(
                self.reply(|event| match event {
                    DeviceEvent::WsqImage { data, .. } => Some(data.len()),
                    _ => None,
                })
                .await?,
            );
        }

        Ok(outcome)
    }

    /// Close the client and wait for its tasks to finish.
    pub async fn finish(self) -> Result<()> {
        self.client.close_and_wait().await?;
        Ok(())
    }

    async fn reply<T>(&mut self, mut pick: impl FnMut(&DeviceEvent) -> Option<T>) -> Result<T> {
        loop {
            let event = self.next_device_event().await?;
            if let Some(value) = pick(&event) {
                return Ok(value);
            }
            debug!("Skipping {}", event.name());
        }
    }

    async fn next_device_event(&mut self) -> Result<DeviceEvent> {
        let event = self.next().await?;
        if let Some(error) = event.as_error() {
            return Err(error.into());
        }
        match event {
            ClientEvent::Device(event) => Ok(event),
            ClientEvent::Disconnected => bail!("Device disconnected"),
            other => bail!("Unexpected {} event", other.name()),
        }
    }

    async fn next(&mut self) -> Result<ClientEvent> {
        tokio::time::timeout(self.reply_timeout, self.events.recv())
            .await
            .with_context(|| format!("No reply within {:?}", self.reply_timeout))?
            .ok_or_else(|| anyhow!("Event stream closed"))
    }
}

/// One-line human readable rendering of a client event.
pub fn describe(event: &ClientEvent) -> String {
    match event {
        ClientEvent::Device(event) => describe_device(event),
        ClientEvent::ConnectionError { message } => format!("connection error: {message}"),
        ClientEvent::ConnectionTimeout { duration_ms } => {
            format!("connection timed out after {duration_ms} ms")
        }
        other => other.name().to_string(),
    }
}

fn describe_device(event: &DeviceEvent) -> String {
    match event {
        DeviceEvent::BatteryPercentage(percentage) => format!("battery: {percentage}%"),
        DeviceEvent::SerialNumber(serial) => format!("serial number: {serial}"),
        DeviceEvent::ModelNumber(model) => format!("model: {model}"),
        DeviceEvent::FirmwareVersion(version) => format!("firmware: {version}"),
        DeviceEvent::ReaderDescription(description) => format!("reader: {description}"),
        DeviceEvent::FpCaptureStatus { status, message } => {
            status_line(Modality::Fingerprint, *status, message)
        }
        DeviceEvent::IrisCaptureStatus { status, message } => {
            status_line(Modality::Iris, *status, message)
        }
        DeviceEvent::LastFrame {
            shape,
            image,
            saved_at,
            ..
        } => format!(
            "last frame: {shape:?} {}x{} saved at slot {saved_at}",
            image.width, image.height
        ),
        DeviceEvent::NfiqScore { score, saved_at } => {
            format!("nfiq score: {score} (slot {saved_at})")
        }
        DeviceEvent::WsqImage { data, saved_at } => {
            format!("wsq image: {} bytes (slot {saved_at})", data.len())
        }
        other => other.name().to_string(),
    }
}

fn status_line(modality: Modality, status: CaptureStatus, message: &str) -> String {
    if message.is_empty() {
        format!("{modality} capture: {}", status.describe(modality))
    } else {
        format!("{modality} capture: {message}")
    }
}
