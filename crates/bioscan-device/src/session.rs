//! Session bookkeeping for one device connection.
//!
//! The session tracks the connection state, the identity reported by the
//! device, the active capture on each sensor and whether a firmware transfer
//! is in flight. It lives behind the client's lock; the methods here never
//! block and never touch the transport.
//!
//! # State Machine Flow
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                     |             |
//!                     |             v
//!                     +-------->  Error  -> Disconnected
//!                     |
//!                     +-------> Disconnected (timeout or disconnect)
//! ```

use bioscan_core::{CaptureKind, DeviceIdentity, Modality, SlotIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::warn;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link to the device.
    #[default]
    Disconnected,

    /// The transport is being opened.
    Connecting,

    /// The link is up and commands may be issued.
    Connected,

    /// The link failed and is being torn down.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        write!(f, "{state}")
    }
}

impl ConnectionState {
    /// Check if the transition to `target` is allowed from this state.
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Error | Self::Disconnected)
                | (Self::Connected, Self::Error | Self::Disconnected)
                | (Self::Error, Self::Disconnected)
        )
    }
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: DateTime<Utc>,
}

/// A capture the device is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Identifier unique within the client.
    pub id: u64,

    /// What was requested.
    pub kind: CaptureKind,

    /// Slot the final image is stored in. Iris captures have none.
    pub slot: Option<SlotIndex>,

    /// Set once the cancel command has been sent.
    pub cancel_requested: bool,
}

impl CaptureRequest {
    pub fn modality(&self) -> Modality {
        self.kind.modality()
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    state: ConnectionState,
    identity: DeviceIdentity,
    fp_capture: Option<CaptureRequest>,
    iris_capture: Option<CaptureRequest>,
    firmware_in_flight: bool,
    epoch: u64,
    next_capture_id: u64,
    closed: bool,
    history: VecDeque<TransitionRecord>,
    history_limit: usize,
}

impl Session {
    pub(crate) fn new(history_limit: usize) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            identity: DeviceIdentity::default(),
            fp_capture: None,
            iris_capture: None,
            firmware_in_flight: false,
            epoch: 0,
            next_capture_id: 1,
            closed: false,
            history: VecDeque::with_capacity(history_limit),
            history_limit,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Connection generation. Bumped whenever a connection attempt starts or
    /// the current one is abandoned, so late results can be recognised.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub(crate) fn identity_mut(&mut self) -> &mut DeviceIdentity {
        &mut self.identity
    }

    pub(crate) fn history(&self) -> &VecDeque<TransitionRecord> {
        &self.history
    }

    /// Move to `to`, recording the change.
    ///
    /// Returns `None` and leaves the state untouched when the transition is
    /// not allowed.
    pub(crate) fn transition_to(&mut self, to: ConnectionState) -> Option<TransitionRecord> {
        if !self.state.can_transition_to(&to) {
            warn!("Ignoring invalid session transition {} -> {}", self.state, to);
            return None;
        }

        let record = TransitionRecord {
            from: self.state,
            to,
            at: Utc::now(),
        };
        self.state = to;

        if self.history_limit > 0 {
            self.history.push_back(record.clone());
            while self.history.len() > self.history_limit {
                self.history.pop_front();
            }
        }

        Some(record)
    }

    pub(crate) fn capture(&self, modality: Modality) -> Option<&CaptureRequest> {
        match modality {
            Modality::Fingerprint => self.fp_capture.as_ref(),
            Modality::Iris => self.iris_capture.as_ref(),
        }
    }

    pub(crate) fn capture_mut(&mut self, modality: Modality) -> Option<&mut CaptureRequest> {
        match modality {
            Modality::Fingerprint => self.fp_capture.as_mut(),
            Modality::Iris => self.iris_capture.as_mut(),
        }
    }

    /// Register a new capture. The caller has checked the slot is free.
    pub(crate) fn begin_capture(&mut self, kind: CaptureKind, slot: Option<SlotIndex>) -> u64 {
        let id = self.next_capture_id;
        self.next_capture_id += 1;

        let request = CaptureRequest {
            id,
            kind,
            slot,
            cancel_requested: false,
        };
        match kind.modality() {
            Modality::Fingerprint => self.fp_capture = Some(request),
            Modality::Iris => self.iris_capture = Some(request),
        }
        id
    }

    /// Remove and return the active capture. Only one caller ever gets it,
    /// which is what makes the terminal event unique.
    pub(crate) fn take_capture(&mut self, modality: Modality) -> Option<CaptureRequest> {
        match modality {
            Modality::Fingerprint => self.fp_capture.take(),
            Modality::Iris => self.iris_capture.take(),
        }
    }

    pub(crate) fn firmware_in_flight(&self) -> bool {
        self.firmware_in_flight
    }

    pub(crate) fn set_firmware_in_flight(&mut self, in_flight: bool) {
        self.firmware_in_flight = in_flight;
    }

    /// Drop everything tied to the current link. Returns the captures that
    /// were still running, fingerprint first.
    pub(crate) fn reset_link(&mut self) -> Vec<CaptureRequest> {
        self.firmware_in_flight = false;
        [Modality::Fingerprint, Modality::Iris]
            .into_iter()
            .filter_map(|modality| self.take_capture(modality))
            .collect()
    }
}
