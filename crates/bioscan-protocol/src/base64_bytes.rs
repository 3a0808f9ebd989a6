//! Base64 encoding for binary payloads in JSON.
//!
//! Image and firmware fields use `#[serde(with = "base64_bytes")]` so a
//! frame carries about 4/3 of the payload size instead of a JSON number
//! array. Non human-readable formats get the raw bytes.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if serializer.is_human_readable() {
        STANDARD.encode(bytes).serialize(serializer)
    } else {
        serializer.serialize_bytes(bytes)
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    } else {
        Bytes::deserialize(deserializer)
    }
}

/// Same encoding for optional payloads; `None` stays `null`.
pub mod option {
    use super::*;

    pub fn serialize<S>(bytes: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&Wrapped(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wrapped: Option<Unwrapped> = Option::deserialize(deserializer)?;
        Ok(wrapped.map(|Unwrapped(bytes)| bytes))
    }

    struct Wrapped<'a>(&'a Bytes);

    impl Serialize for Wrapped<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            super::serialize(self.0, serializer)
        }
    }

    struct Unwrapped(Bytes);

    impl<'de> Deserialize<'de> for Unwrapped {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            super::deserialize(deserializer).map(Unwrapped)
        }
    }
}
