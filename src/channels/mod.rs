//! Channel naming and validation
//!
//! Channels are colon-separated segments: `driver:42:deliveries`
//! Each segment must match: [a-zA-Z0-9_-]+
//!
//! Naming conventions used by the grant policy:
//! - `user:<id>` - private per-user channel
//! - `public:announcements` - global announcements
//! - `admin:notifications`, `system:monitoring` - admin channels
//! - `dispatchers:channel`, `deliveries:updates` - dispatcher channels
//! - `drivers:channel`, `driver:<id>:deliveries` - driver channels
//! - `customer:<id>:deliveries` - customer delivery feed

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Valid characters for a channel segment
fn is_valid_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a single segment
fn is_valid_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_valid_segment_char)
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel name cannot be empty")]
    Empty,

    #[error("invalid segment '{0}': must match [a-zA-Z0-9_-]+")]
    InvalidSegment(String),

    #[error("empty segment in channel name")]
    EmptySegment,
}

/// A validated channel name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel {
    /// The full channel name, e.g. "driver:42:deliveries"
    name: String,
}

impl Channel {
    /// Parse and validate a channel name
    pub fn parse(name: &str) -> Result<Self, ChannelError> {
        if name.is_empty() {
            return Err(ChannelError::Empty);
        }

        for part in name.split(':') {
            if part.is_empty() {
                return Err(ChannelError::EmptySegment);
            }

            if !is_valid_segment(part) {
                return Err(ChannelError::InvalidSegment(part.to_string()));
            }
        }

        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Private per-user channel: `user:<id>`
    pub fn user(user_id: &str) -> Self {
        Self {
            name: format!("user:{user_id}"),
        }
    }

    /// Global announcements channel: `public:announcements`
    pub fn announcements() -> Self {
        Self {
            name: "public:announcements".to_string(),
        }
    }

    /// Per-driver delivery feed: `driver:<id>:deliveries`
    pub fn driver_deliveries(user_id: &str) -> Self {
        Self {
            name: format!("driver:{user_id}:deliveries"),
        }
    }

    /// Per-customer delivery feed: `customer:<id>:deliveries`
    pub fn customer_deliveries(user_id: &str) -> Self {
        Self {
            name: format!("customer:{user_id}:deliveries"),
        }
    }

    /// A well-known shared channel (`admin:notifications` etc.)
    ///
    /// Only for names known valid at compile time.
    pub(crate) fn well_known(name: &'static str) -> Self {
        debug_assert!(Self::parse(name).is_ok());
        Self {
            name: name.to_string(),
        }
    }

    /// Get the channel name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Get a specific segment by index
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.name.split(':').nth(index)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Channel::parse(&value)
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.name
    }
}
