//! Shared types for hookscope
//!
//! This crate contains data structures used across multiple hookscope crates.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Stream Identity Types
// ============================================================================

/// Opaque key selecting which logical debug stream is active.
///
/// In the hooks builder deployment this is an XRPL account address; nothing
/// here depends on that shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamIdentity(String);

impl StreamIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamIdentity {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

impl From<String> for StreamIdentity {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Account choice pushed by an external selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSelection {
    /// Display name shown alongside the stream
    pub label: String,

    /// Address the stream is keyed by
    pub address: StreamIdentity,
}

impl AccountSelection {
    pub fn new(label: impl Into<String>, address: impl Into<StreamIdentity>) -> Self {
        Self {
            label: label.into(),
            address: address.into(),
        }
    }
}

// ============================================================================
// Log Record Types
// ============================================================================

/// Semantic severity of a log record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogKind {
    /// Ordinary stream output
    #[default]
    Plain,
    /// Lifecycle success, currently only the stream-opened notice
    Success,
    /// Transport trouble surfaced to the reader
    Error,
}

impl LogKind {
    /// Display string for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "log",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// A single debug stream record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity driving presentation
    pub kind: LogKind,

    /// Unix-millisecond capture time, assigned when the record is created
    pub timestamp: i64,

    /// Human-readable text with any embedded payload removed
    pub message: String,

    /// Local time-of-day label, or the raw leading token when it does not
    /// parse as a calendar date
    pub time_label: Option<String>,

    /// Embedded structured payload, pretty-printed
    pub payload: Option<String>,

    /// Presentation hint; payloads start folded
    pub collapsed: bool,
}

impl LogRecord {
    /// Create a bare record with the current capture time
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now().timestamp_millis(),
            message: message.into(),
            time_label: None,
            payload: None,
            collapsed: true,
        }
    }
}

/// Shared handle to an immutable record; the store only appends or clears
pub type ArcLogRecord = Arc<LogRecord>;

// ============================================================================
// Connection Types
// ============================================================================

/// Connection lifecycle state as seen by consumers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No stream has been selected yet, or the selection was cleared
    #[default]
    Idle,
    /// The live connection completed its handshake
    Opened,
    /// The server or the network ended the connection
    Closed,
}

impl ConnectionState {
    /// Display label for this state
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Opened => "opened",
            Self::Closed => "closed",
        }
    }
}
