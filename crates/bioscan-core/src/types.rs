use crate::{
    Result,
    constants::{
        CLEAR_ALL_SLOTS_SENTINEL, DEFAULT_SECURITY_LEVEL, MAX_BINARY_LED, MAX_LED_BRIGHTNESS,
        MAX_MULTI_MODE_LED, MAX_NFIQ_SCORE, MAX_POWER_OFF_SECONDS, MAX_SECURITY_LEVEL,
        MIN_LED_BRIGHTNESS, MIN_NFIQ_SCORE, MIN_SECURITY_LEVEL,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Index of an image held in the device's volatile buffer.
///
/// The device decides how many slots exist; the client only guarantees
/// the index is non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotIndex(u32);

impl SlotIndex {
    pub const fn new(index: u32) -> Self {
        SlotIndex(index)
    }

    /// Convert a signed wire value into a slot.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlot` for negative values.
    pub fn from_wire(value: i32) -> Result<Self> {
        u32::try_from(value)
            .map(SlotIndex)
            .map_err(|_| Error::InvalidSlot(value.into()))
    }

    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for SlotIndex {
    fn from(index: u32) -> Self {
        SlotIndex(index)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which saved images a clear command targets.
///
/// Serialized as the signed wire value, with `All` mapped to
/// [`CLEAR_ALL_SLOTS_SENTINEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ClearTarget {
    /// A single slot.
    Slot(SlotIndex),

    /// Every slot in the volatile buffer.
    All,
}

impl ClearTarget {
    /// Signed wire representation.
    #[must_use]
    pub fn to_wire(&self) -> i64 {
        match self {
            Self::Slot(slot) => i64::from(slot.as_u32()),
            Self::All => i64::from(CLEAR_ALL_SLOTS_SENTINEL),
        }
    }

    /// Parse the signed wire representation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlot` for negative values other than the sentinel
    /// and for values that do not fit a slot index.
    pub fn from_wire(value: i64) -> Result<Self> {
        if value == i64::from(CLEAR_ALL_SLOTS_SENTINEL) {
            return Ok(Self::All);
        }
        u32::try_from(value)
            .map(|index| Self::Slot(SlotIndex(index)))
            .map_err(|_| Error::InvalidSlot(value))
    }
}

impl From<SlotIndex> for ClearTarget {
    fn from(slot: SlotIndex) -> Self {
        Self::Slot(slot)
    }
}

impl From<ClearTarget> for i64 {
    fn from(target: ClearTarget) -> Self {
        target.to_wire()
    }
}

impl TryFrom<i64> for ClearTarget {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::from_wire(value)
    }
}

impl fmt::Display for ClearTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Slot(slot) => write!(f, "slot {slot}"),
            Self::All => write!(f, "all slots"),
        }
    }
}

/// Sensor family a capture runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Fingerprint,
    Iris,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fingerprint => write!(f, "fingerprint"),
            Self::Iris => write!(f, "iris"),
        }
    }
}

/// Kind of capture a request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    OneFinger,
    TwoFinger,
    FourFinger,
    RolledFinger,
    Iris,
}

impl CaptureKind {
    /// Sensor the capture runs on.
    #[must_use]
    pub fn modality(&self) -> Modality {
        match self {
            Self::Iris => Modality::Iris,
            _ => Modality::Fingerprint,
        }
    }

    /// Number of fingers placed on the platen, if this is a fingerprint capture.
    #[must_use]
    pub fn finger_count(&self) -> Option<u8> {
        match self {
            Self::OneFinger | Self::RolledFinger => Some(1),
            Self::TwoFinger => Some(2),
            Self::FourFinger => Some(4),
            Self::Iris => None,
        }
    }

    /// Frame shape the capture streams.
    #[must_use]
    pub fn frame_shape(&self) -> Option<FrameShape> {
        match self {
            Self::RolledFinger => Some(FrameShape::Rolled),
            Self::Iris => None,
            _ => Some(FrameShape::Flat),
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::OneFinger => "one-finger",
            Self::TwoFinger => "two-finger",
            Self::FourFinger => "four-finger",
            Self::RolledFinger => "rolled-finger",
            Self::Iris => "iris",
        };
        write!(f, "{name}")
    }
}

/// Whether a fingerprint frame came from a flat or a rolled capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameShape {
    Flat,
    Rolled,
}

macro_rules! bounded_u8 {
    ($(#[$meta:meta])* $name:ident, $label:literal, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "u8", into = "u8")]
        pub struct $name(u8);

        impl $name {
            /// Create the value with range validation.
            ///
            /// # Errors
            /// Returns `Error::OutOfRange` when the value is outside the accepted range.
            pub fn new(value: u8) -> Result<Self> {
                if !($min..=$max).contains(&value) {
                    return Err(Error::out_of_range($label, value, $min, $max));
                }
                Ok($name(value))
            }

            #[must_use]
            pub fn get(&self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = Error;

            fn try_from(value: u8) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

bounded_u8!(
    /// LED brightness (0-100).
    LedBrightness,
    "LED brightness",
    MIN_LED_BRIGHTNESS,
    MAX_LED_BRIGHTNESS
);

bounded_u8!(
    /// Minimum NFIQ score a capture must reach (1 best, 5 worst).
    NfiqScore,
    "NFIQ score",
    MIN_NFIQ_SCORE,
    MAX_NFIQ_SCORE
);

bounded_u8!(
    /// Strictness of the duplicate-finger check (1-7).
    SecurityLevel,
    "Security level",
    MIN_SECURITY_LEVEL,
    MAX_SECURITY_LEVEL
);

impl Default for SecurityLevel {
    fn default() -> Self {
        SecurityLevel(DEFAULT_SECURITY_LEVEL)
    }
}

/// Idle time before the device powers itself off. Zero disables auto power-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PowerOffTimeout(u32);

impl PowerOffTimeout {
    pub const DISABLED: PowerOffTimeout = PowerOffTimeout(0);

    /// # Errors
    /// Returns `Error::OutOfRange` above one hour.
    pub fn from_secs(seconds: u32) -> Result<Self> {
        if seconds > MAX_POWER_OFF_SECONDS {
            return Err(Error::out_of_range(
                "Power-off timeout",
                seconds,
                0u32,
                MAX_POWER_OFF_SECONDS,
            ));
        }
        Ok(PowerOffTimeout(seconds))
    }

    #[must_use]
    pub fn as_secs(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.0 == 0
    }

    /// The delay as a `Duration`, or `None` when auto power-off is disabled.
    #[must_use]
    pub fn as_duration(&self) -> Option<Duration> {
        (!self.is_disabled()).then(|| Duration::from_secs(u64::from(self.0)))
    }
}

impl TryFrom<u32> for PowerOffTimeout {
    type Error = Error;

    fn try_from(seconds: u32) -> Result<Self> {
        Self::from_secs(seconds)
    }
}

impl From<PowerOffTimeout> for u32 {
    fn from(timeout: PowerOffTimeout) -> Self {
        timeout.0
    }
}

/// Blink pattern applied by the advanced LED control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlinkTiming {
    /// Milliseconds the LED stays lit per cycle.
    pub on_ms: u32,

    /// Milliseconds the LED stays dark per cycle.
    pub off_ms: u32,
}

/// Per-channel LED configuration.
///
/// The power and fingerprint LEDs take a mode from 0 to 3, the
/// communication and iris LEDs are on/off (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedControl {
    power: u8,
    fp: u8,
    com: u8,
    iris: u8,
    blink: Option<BlinkTiming>,
}

impl LedControl {
    /// Create a steady LED configuration.
    ///
    /// # Errors
    /// Returns `Error::OutOfRange` naming the first channel whose mode is invalid.
    pub fn new(power: u8, fp: u8, com: u8, iris: u8) -> Result<Self> {
        for (label, value, max) in [
            ("Power LED mode", power, MAX_MULTI_MODE_LED),
            ("Fingerprint LED mode", fp, MAX_MULTI_MODE_LED),
            ("Communication LED mode", com, MAX_BINARY_LED),
            ("Iris LED mode", iris, MAX_BINARY_LED),
        ] {
            if value > max {
                return Err(Error::out_of_range(label, value, 0u8, max));
            }
        }

        Ok(Self {
            power,
            fp,
            com,
            iris,
            blink: None,
        })
    }

    /// Add a blink pattern.
    #[must_use]
    pub fn with_blink(mut self, on_ms: u32, off_ms: u32) -> Self {
        self.blink = Some(BlinkTiming { on_ms, off_ms });
        self
    }

    pub fn power(&self) -> u8 {
        self.power
    }

    pub fn fp(&self) -> u8 {
        self.fp
    }

    pub fn com(&self) -> u8 {
        self.com
    }

    pub fn iris(&self) -> u8 {
        self.iris
    }

    pub fn blink(&self) -> Option<BlinkTiming> {
        self.blink
    }
}

/// Identity of the connected device, filled in as query replies arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device serial number.
    pub serial_number: Option<String>,

    /// Model number.
    pub model: Option<String>,

    /// Firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceIdentity {
    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the model number.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }

    /// True once every field has been reported by the device.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.serial_number.is_some() && self.model.is_some() && self.firmware_version.is_some()
    }
}
