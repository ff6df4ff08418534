//! Positions in the remote change stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque token marking a position in the remote change stream.
///
/// Only the server interprets the contents. The empty token means
/// "from the beginning of the stream".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Creates a cursor from a server-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the cursor at the start of the change stream.
    pub fn initial() -> Self {
        Self(String::new())
    }

    /// Returns true if this is the start-of-stream cursor.
    pub fn is_initial(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw token.
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initial() {
            f.write_str("<initial>")
        } else {
            f.write_str(&self.0)
        }
    }
}
