//! Branded ID newtypes for type safety.
//!
//! Each entity has a distinct ID type implemented as a newtype wrapper
//! around `String`, so a run ID cannot be passed where a client connection
//! ID is expected.
//!
//! Run IDs are handed out to callers and used to address event rooms, so
//! they are random UUID v4 (unguessable, URL-safe) rather than time-ordered.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Generate a new random UUID v4 string.
fn new_v4() -> String {
    Uuid::new_v4().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v4())
            }

            /// Create from an existing string value without validation.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for one end-to-end run.
    RunId
}

branded_id! {
    /// Unique identifier for a connected WebSocket client.
    ClientId
}

/// A run identifier that does not match the required format.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid run_id format: {0:?}")]
pub struct InvalidRunId(pub String);

impl RunId {
    /// Parse a caller-supplied run identifier, accepting only the
    /// hyphenated lowercase UUID form (`8-4-4-4-12` hex groups).
    ///
    /// Every identifier arriving over the API edge goes through this
    /// check before it is used to address storage or a room.
    pub fn parse(s: &str) -> Result<Self, InvalidRunId> {
        if is_hyphenated_uuid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(InvalidRunId(s.to_owned()))
        }
    }
}

/// Check the `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` lowercase-hex shape.
fn is_hyphenated_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    s.bytes().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit() && !b.is_ascii_uppercase(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
