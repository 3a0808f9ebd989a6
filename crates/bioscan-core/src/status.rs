//! Capture status codes reported by the device.
//!
//! Fingerprint and iris captures share the same numeric codes for the
//! generic states (started, in progress, completed, error) but give the
//! remaining codes sensor-specific meanings:
//!
//! | code | fingerprint              | iris                     |
//! |------|--------------------------|--------------------------|
//! | 0    | started                  | started                  |
//! | 1    | in progress              | in progress              |
//! | 2    | completed                | completed                |
//! | 3    | error                    | error                    |
//! | 4    | finger removed too early | eyes not positioned      |
//! | 5    | NFIQ too low             | lighting unsuitable      |
//! | 6    | rolling smear            | eyes moved               |
//! | 7    | finger not detected      | quality insufficient     |
//!
//! A fingerprint capture ends on codes 3, 5 and 6; its success is signalled
//! by the last-frame event rather than by code 2. An iris capture has no
//! last frame, so it ends on code 2 as well as on 3, 5 and 7.

use crate::types::Modality;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw capture status code with classification helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureStatus(i32);

impl CaptureStatus {
    pub const STARTED: CaptureStatus = CaptureStatus(0);
    pub const IN_PROGRESS: CaptureStatus = CaptureStatus(1);
    pub const COMPLETED: CaptureStatus = CaptureStatus(2);
    pub const ERROR: CaptureStatus = CaptureStatus(3);
    pub const REMOVED_OR_MISPLACED: CaptureStatus = CaptureStatus(4);
    pub const QUALITY_OR_LIGHTING: CaptureStatus = CaptureStatus(5);
    pub const SMEAR_OR_MOVEMENT: CaptureStatus = CaptureStatus(6);
    pub const NOT_DETECTED_OR_INSUFFICIENT: CaptureStatus = CaptureStatus(7);

    pub const fn new(code: i32) -> Self {
        CaptureStatus(code)
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        self.0
    }

    /// Whether this status resets the capturing flag of the given sensor.
    #[must_use]
    pub fn ends_capture(&self, modality: Modality) -> bool {
        match modality {
            Modality::Fingerprint => matches!(self.0, 3 | 5 | 6),
            Modality::Iris => matches!(self.0, 2 | 3 | 5 | 7),
        }
    }

    /// Whether this status reports a failed capture.
    #[must_use]
    pub fn is_failure(&self, modality: Modality) -> bool {
        self.ends_capture(modality) && *self != Self::COMPLETED
    }

    /// Human readable description, used when the device sends no message.
    #[must_use]
    pub fn describe(&self, modality: Modality) -> &'static str {
        match (modality, self.0) {
            (Modality::Fingerprint, 0) => "Capture started, place finger on sensor",
            (Modality::Fingerprint, 1) => "Capture in progress",
            (Modality::Fingerprint, 2) => "Capture completed",
            (Modality::Fingerprint, 3) => "Capture error",
            (Modality::Fingerprint, 4) => "Finger removed too early",
            (Modality::Fingerprint, 5) => "Fingerprint quality too low (NFIQ)",
            (Modality::Fingerprint, 6) => "Rolling smear detected",
            (Modality::Fingerprint, 7) => "Finger not detected",
            (Modality::Iris, 0) => "Iris capture started, position eyes in front of device",
            (Modality::Iris, 1) => "Iris capture in progress",
            (Modality::Iris, 2) => "Iris capture completed",
            (Modality::Iris, 3) => "Iris capture error",
            (Modality::Iris, 4) => "Eyes not properly positioned",
            (Modality::Iris, 5) => "Lighting conditions not suitable",
            (Modality::Iris, 6) => "Eyes moved during capture",
            (Modality::Iris, 7) => "Quality not sufficient for enrollment",
            _ => "Unknown capture status",
        }
    }
}

impl From<i32> for CaptureStatus {
    fn from(code: i32) -> Self {
        CaptureStatus(code)
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
