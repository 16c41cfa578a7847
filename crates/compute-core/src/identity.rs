//! Identidad de job: hash de contenido de `(plugin, request canónico)`.
//!
//! Función pura. Dos requests semánticamente iguales (mismo plugin, mismos
//! campos en cualquier orden, listas ausentes o vacías) producen la misma
//! identidad.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::constants::{IDENTITY_BYTES, IDENTITY_HEX_LEN};
use crate::hashing::{digest_128, to_canonical_json};
use crate::model::JobRequest;

/// Identidad de 128 bits. Se muestra y serializa como hex en minúsculas.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId([u8; IDENTITY_BYTES]);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed job id '{0}': expected 32 lowercase hex characters")]
pub struct JobIdParseError(pub String);

impl JobId {
    pub const fn from_bytes(bytes: [u8; IDENTITY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.to_hex())
    }
}

impl FromStr for JobId {
    type Err = JobIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Sólo se aceptan minúsculas: la forma canónica es la única válida.
        if s.len() != IDENTITY_HEX_LEN || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(JobIdParseError(s.to_string()));
        }
        let mut out = [0u8; IDENTITY_BYTES];
        hex::decode_to_slice(s, &mut out).map_err(|_| JobIdParseError(s.to_string()))?;
        Ok(Self(out))
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct JobIdVisitor;

        impl Visitor<'_> for JobIdVisitor {
            type Value = JobId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 32 character lowercase hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<JobId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(JobIdVisitor)
    }
}

/// JSON canónico del request normalizado (el que viaja en el mensaje de cola).
pub fn canonical_request_json(request: &JobRequest) -> String {
    to_canonical_json(&request.clone().normalized().to_value())
}

/// `identityOf(segment, request)`.
pub fn identity_of(url_segment: &str, request: &JobRequest) -> JobId {
    let canonical = canonical_request_json(request);
    let envelope = Value::Array(vec![Value::String(url_segment.to_string()), Value::String(canonical)]);
    JobId(digest_128(envelope.to_string().as_bytes()))
}
