//! Commands sent from the client to the capture device.

use bioscan_core::{
    CaptureKind, ClearTarget, LedBrightness, LedControl, NfiqScore, PowerOffTimeout,
    SecurityLevel, SlotIndex,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request the device answers asynchronously with one or more
/// [`DeviceEvent`](crate::DeviceEvent)s.
///
/// Values carried here are already validated by their `bioscan_core` types,
/// so a `Command` that exists is well-formed. Whether the device accepts it
/// is only known from its reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Command {
    // Device information
    GetBatteryPercentage,
    GetDeviceSerialNumber,
    GetFirmwareVersion,
    GetModelNumber,
    GetReaderDescription,

    // Capture
    /// Start a fingerprint capture. `kind` is never [`CaptureKind::Iris`].
    StartFpCapture {
        kind: CaptureKind,
        slot: SlotIndex,
    },
    CancelFpCapture,
    StartIrisCapture,
    CancelIrisCapture,

    // Power management
    SetFpPower {
        on: bool,
    },
    GetFpPowerStatus,
    SetIrisPower {
        on: bool,
    },
    GetIrisPowerStatus,

    // Settings
    SetLedBrightness(LedBrightness),
    GetLedBrightness,
    SetMinimumNfiqScore(NfiqScore),
    GetPowerOffMode,
    SetPowerOffMode(PowerOffTimeout),
    SetLedControl(LedControl),

    // Saved images
    ClearSavedImages(ClearTarget),
    GetNfiqScore(SlotIndex),
    GetSegmentedImage(SlotIndex),
    GetWsqImage {
        slot: SlotIndex,
        cropped: bool,
    },
    IsFingerDuplicated {
        slot: SlotIndex,
        security_level: SecurityLevel,
    },

    // Firmware
    StartFirmwareUpdate {
        #[serde(with = "crate::base64_bytes")]
        image: Bytes,
        legacy: bool,
    },
}

impl Command {
    /// Stable name used in logs and error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetBatteryPercentage => "get_battery_percentage",
            Self::GetDeviceSerialNumber => "get_device_serial_number",
            Self::GetFirmwareVersion => "get_firmware_version",
            Self::GetModelNumber => "get_model_number",
            Self::GetReaderDescription => "get_reader_description",
            Self::StartFpCapture { .. } => "start_fp_capture",
            Self::CancelFpCapture => "cancel_fp_capture",
            Self::StartIrisCapture => "start_iris_capture",
            Self::CancelIrisCapture => "cancel_iris_capture",
            Self::SetFpPower { .. } => "set_fp_power",
            Self::GetFpPowerStatus => "get_fp_power_status",
            Self::SetIrisPower { .. } => "set_iris_power",
            Self::GetIrisPowerStatus => "get_iris_power_status",
            Self::SetLedBrightness(_) => "set_led_brightness",
            Self::GetLedBrightness => "get_led_brightness",
            Self::SetMinimumNfiqScore(_) => "set_minimum_nfiq_score",
            Self::GetPowerOffMode => "get_power_off_mode",
            Self::SetPowerOffMode(_) => "set_power_off_mode",
            Self::SetLedControl(_) => "set_led_control",
            Self::ClearSavedImages(_) => "clear_saved_images",
            Self::GetNfiqScore(_) => "get_nfiq_score",
            Self::GetSegmentedImage(_) => "get_segmented_image",
            Self::GetWsqImage { .. } => "get_wsq_image",
            Self::IsFingerDuplicated { .. } => "is_finger_duplicated",
            Self::StartFirmwareUpdate { .. } => "start_firmware_update",
        }
    }

    /// True for commands that begin a capture sequence.
    #[must_use]
    pub fn starts_capture(&self) -> bool {
        matches!(self, Self::StartFpCapture { .. } | Self::StartIrisCapture)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartFpCapture { kind, slot } => {
                write!(f, "{} ({kind}, slot {slot})", self.name())
            }
            Self::StartFirmwareUpdate { image, legacy } => {
                write!(
                    f,
                    "{} ({} bytes, legacy: {legacy})",
                    self.name(),
                    image.len()
                )
            }
            _ => f.write_str(self.name()),
        }
    }
}
