//! CBOR (de)serialization helpers for the data structures in this crate.

use chrono::{DateTime, SecondsFormat, Utc};
use ciborium::tag;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(thiserror::Error, Debug)]
pub enum CborError {
    #[error("CBOR serialization failed: {0}")]
    Serialization(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("CBOR deserialization failed: {0}")]
    Deserialization(#[from] ciborium::de::Error<std::io::Error>),
    #[error("CBOR value conversion failed: {0}")]
    Value(#[from] ciborium::value::Error),
}

pub fn cbor_serialize<T: Serialize>(val: &T) -> Result<Vec<u8>, CborError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(val, &mut buf)?;
    Ok(buf)
}

pub fn cbor_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CborError> {
    let val = ciborium::de::from_reader(bytes)?;
    Ok(val)
}

/// Wrapper for data that is to be encoded as `#6.24(bstr .cbor T)`, i.e., the
/// CBOR encoding of `T` wrapped in a byte string with tag 24 ("encoded CBOR
/// data item"). ISO 18013-5 uses this whenever a digest or signature must be
/// computed over the exact encoding of a nested structure.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedBytes<T>(pub T);

impl<T> From<T> for TaggedBytes<T> {
    fn from(val: T) -> Self {
        TaggedBytes(val)
    }
}

impl<T: Serialize> Serialize for TaggedBytes<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = cbor_serialize(&self.0).map_err(serde::ser::Error::custom)?;
        tag::Required::<ByteBuf, 24>(ByteBuf::from(bytes)).serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for TaggedBytes<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag::Required::<ByteBuf, 24>(bytes) = tag::Required::deserialize(deserializer)?;
        let inner = cbor_deserialize(&bytes).map_err(serde::de::Error::custom)?;
        Ok(TaggedBytes(inner))
    }
}

/// An RFC 3339 date-time string wrapped in CBOR tag 0 (`tdate` in the ISO
/// 18013-5 CDDL).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tdate(pub tag::Required<String, 0>);

impl From<DateTime<Utc>> for Tdate {
    fn from(t: DateTime<Utc>) -> Self {
        Tdate(tag::Required(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
    }
}

impl Tdate {
    pub fn as_str(&self) -> &str {
        &self.0 .0
    }
}
