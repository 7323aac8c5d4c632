//! Debug stream reconciliation for hookscope
//!
//! This crate owns the live WebSocket connection to a Hooks builder debug
//! stream, the one-shot history fetch that catches a restored identity up,
//! and the session state machine that merges both into one ordered record
//! sequence. The [`StreamDriver`] pump is the only entry point that mutates
//! a session; everything else communicates with it over channels.

mod backfill;
mod config;
mod connection;
mod driver;
mod error;
mod session;

pub use backfill::{BackfillClient, BackfillEntry, BackfillRequest};
pub use config::{DEFAULT_CONFIG_FILE, DEFAULT_HOST, StreamConfig};
pub use connection::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, ConnId, ConnectionEvent, ConnectionHandle, Connector,
    SessionEvent, WireMessage, WsConnector,
};
pub use driver::{SessionCommand, StreamDriver};
pub use error::StreamError;
pub use session::{CONNECTION_TROUBLE, EventOutcome, StreamSession};

// Re-export types used in our public API
pub use hookscope_types::{AccountSelection, ArcLogRecord, ConnectionState, StreamIdentity};
