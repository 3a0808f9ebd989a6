//! Events originated by the capture device.
//!
//! Every callback of the device's notification surface is one variant of
//! [`DeviceEvent`]. Capture sequences are made of status events, streaming
//! preview frames and exactly one terminal event; [`DeviceEvent::is_terminal_for`]
//! tells which is which.

use bioscan_core::{CaptureStatus, ClearTarget, FrameShape, Modality, SlotIndex};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An 8-bit grayscale image as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameImage {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Row-major pixel data, one byte per pixel.
    #[serde(with = "crate::base64_bytes")]
    pub pixels: Bytes,
}

impl FrameImage {
    pub fn new(width: u32, height: u32, pixels: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Whether the pixel buffer matches the declared dimensions.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        u64::from(self.width) * u64::from(self.height) == self.pixels.len() as u64
    }
}

/// A failing capture status, ready to be surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Sensor that reported the failure.
    pub modality: Modality,

    /// Status code from the device.
    pub status: CaptureStatus,

    /// Message from the device, or the catalogue description when it sent none.
    pub message: String,
}

/// Notification produced by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    // Fingerprint capture
    FpCaptureStatus {
        status: CaptureStatus,
        message: String,
    },
    FpCaptureCancelled,
    Streaming {
        image: FrameImage,
    },
    StreamingRolled {
        image: FrameImage,
        rolling_state: i32,
        vertical_line_x: i32,
    },
    /// Final frame of a fingerprint capture. `raw` carries the uncompressed
    /// sensor data when the device provides it.
    LastFrame {
        shape: FrameShape,
        image: FrameImage,
        #[serde(with = "crate::base64_bytes::option", default)]
        raw: Option<Bytes>,
        saved_at: SlotIndex,
    },

    // Iris capture
    IrisCaptureStatus {
        status: CaptureStatus,
        message: String,
    },
    IrisCaptureCancelled,

    // Device information
    BatteryPercentage(u8),
    SerialNumber(String),
    FirmwareVersion(String),
    ModelNumber(String),
    ReaderDescription(String),

    // Settings
    LedBrightness(u8),
    LedBrightnessSet(u8),
    MinimumNfiqScoreSet(u8),
    PowerOffMode(u32),
    PowerOffModeSet(u32),
    LedControlSet {
        power: u8,
        fp: u8,
        com: u8,
        iris: u8,
    },

    // Power management
    FpPowerStatus(bool),
    FpPowerOn(bool),
    FpPowerOff,
    IrisPowerStatus(bool),
    IrisPowerOn(bool),
    IrisPowerOff,

    // Saved images
    NfiqScore {
        score: u8,
        saved_at: SlotIndex,
    },
    SegmentedImage {
        #[serde(with = "crate::base64_bytes")]
        data: Bytes,
        saved_at: SlotIndex,
    },
    WsqImage {
        #[serde(with = "crate::base64_bytes")]
        data: Bytes,
        saved_at: SlotIndex,
    },
    FingerDuplicated {
        indicator: i32,
    },
    SavedImagesCleared(ClearTarget),

    // Firmware
    FirmwareTransferCompleted {
        result: i64,
    },
}

impl DeviceEvent {
    /// Stable name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FpCaptureStatus { .. } => "fp_capture_status",
            Self::FpCaptureCancelled => "fp_capture_cancelled",
            Self::Streaming { .. } => "streaming",
            Self::StreamingRolled { .. } => "streaming_rolled",
            Self::LastFrame { .. } => "last_frame",
            Self::IrisCaptureStatus { .. } => "iris_capture_status",
            Self::IrisCaptureCancelled => "iris_capture_cancelled",
            Self::BatteryPercentage(_) => "battery_percentage",
            Self::SerialNumber(_) => "serial_number",
            Self::FirmwareVersion(_) => "firmware_version",
            Self::ModelNumber(_) => "model_number",
            Self::ReaderDescription(_) => "reader_description",
            Self::LedBrightness(_) => "led_brightness",
            Self::LedBrightnessSet(_) => "led_brightness_set",
            Self::MinimumNfiqScoreSet(_) => "minimum_nfiq_score_set",
            Self::PowerOffMode(_) => "power_off_mode",
            Self::PowerOffModeSet(_) => "power_off_mode_set",
            Self::LedControlSet { .. } => "led_control_set",
            Self::FpPowerStatus(_) => "fp_power_status",
            Self::FpPowerOn(_) => "fp_power_on",
            Self::FpPowerOff => "fp_power_off",
            Self::IrisPowerStatus(_) => "iris_power_status",
            Self::IrisPowerOn(_) => "iris_power_on",
            Self::IrisPowerOff => "iris_power_off",
            Self::NfiqScore { .. } => "nfiq_score",
            Self::SegmentedImage { .. } => "segmented_image",
            Self::WsqImage { .. } => "wsq_image",
            Self::FingerDuplicated { .. } => "finger_duplicated",
            Self::SavedImagesCleared(_) => "saved_images_cleared",
            Self::FirmwareTransferCompleted { .. } => "firmware_transfer_completed",
        }
    }

    /// Sensor whose capture sequence this event belongs to, if any.
    #[must_use]
    pub fn capture_modality(&self) -> Option<Modality> {
        match self {
            Self::FpCaptureStatus { .. }
            | Self::FpCaptureCancelled
            | Self::Streaming { .. }
            | Self::StreamingRolled { .. }
            | Self::LastFrame { .. } => Some(Modality::Fingerprint),
            Self::IrisCaptureStatus { .. } | Self::IrisCaptureCancelled => Some(Modality::Iris),
            _ => None,
        }
    }

    /// Whether this event ends the active capture on `modality`.
    #[must_use]
    pub fn is_terminal_for(&self, modality: Modality) -> bool {
        match (modality, self) {
            (Modality::Fingerprint, Self::LastFrame { .. } | Self::FpCaptureCancelled) => true,
            (Modality::Fingerprint, Self::FpCaptureStatus { status, .. }) => {
                status.ends_capture(Modality::Fingerprint)
            }
            (Modality::Iris, Self::IrisCaptureCancelled) => true,
            (Modality::Iris, Self::IrisCaptureStatus { status, .. }) => {
                status.ends_capture(Modality::Iris)
            }
            _ => false,
        }
    }

    /// The cancel acknowledgement for `modality`.
    #[must_use]
    pub fn cancelled(modality: Modality) -> Self {
        match modality {
            Modality::Fingerprint => Self::FpCaptureCancelled,
            Modality::Iris => Self::IrisCaptureCancelled,
        }
    }

    /// The failure this event reports, if it is a failing capture status.
    #[must_use]
    pub fn rejection(&self) -> Option<Rejection> {
        let (modality, status, message) = match self {
            Self::FpCaptureStatus { status, message } => (Modality::Fingerprint, status, message),
            Self::IrisCaptureStatus { status, message } => (Modality::Iris, status, message),
            _ => return None,
        };

        if !status.is_failure(modality) {
            return None;
        }

        let message = if message.is_empty() {
            status.describe(modality).to_string()
        } else {
            message.clone()
        };

        Some(Rejection {
            modality,
            status: *status,
            message,
        })
    }
}
