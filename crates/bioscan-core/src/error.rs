use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Value errors
    #[error("{name} must be {min}-{max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid slot index: {0}")]
    InvalidSlot(i64),

    #[error("Firmware image is empty")]
    EmptyFirmware,
}

impl Error {
    /// Build an [`Error::OutOfRange`] for a named setting.
    pub fn out_of_range(
        name: &'static str,
        value: impl Into<i64>,
        min: impl Into<i64>,
        max: impl Into<i64>,
    ) -> Self {
        Self::OutOfRange {
            name,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
