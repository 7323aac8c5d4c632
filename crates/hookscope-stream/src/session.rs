use std::sync::Arc;

use tokio::sync::mpsc;

use hookscope_logs::{LogParser, LogStore, is_internal_noise};
use hookscope_types::{
    AccountSelection, ArcLogRecord, ConnectionState, LogKind, LogRecord, StreamIdentity,
};

use crate::backfill::{BackfillEntry, BackfillRequest};
use crate::connection::{
    ConnId, ConnectionEvent, ConnectionHandle, Connector, SessionEvent, WireMessage,
};
use crate::error::StreamError;

/// Record text appended when the transport reports trouble
pub const CONNECTION_TROUBLE: &str =
    "Something went wrong! Check your connection and try again.";

/// What one session call changed, for the caller to forward
#[derive(Debug, Default)]
pub struct EventOutcome {
    /// Records appended to the store, in append order
    pub appended: Vec<ArcLogRecord>,

    /// History fetch to run; armed at most once, when a restored identity's
    /// connection opens
    pub backfill: Option<BackfillRequest>,
}

/// Reconciles one live debug stream with its record store.
///
/// The session owns at most one connection handle at a time and is the only
/// writer of its store. Events are tagged with the generation id of the
/// connection that produced them; events from a replaced connection are
/// discarded, which keeps a torn-down stream from writing into its
/// successor's transcript.
pub struct StreamSession {
    selection: Option<AccountSelection>,
    state: ConnectionState,
    store: LogStore,
    connection: Option<ConnectionHandle>,
    next_conn: u64,

    /// Set by `restore`, consumed by the next open to arm the history fetch
    resume_from: Option<StreamIdentity>,

    connector: Arc<dyn Connector>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl StreamSession {
    pub fn new(connector: Arc<dyn Connector>, events_tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            selection: None,
            state: ConnectionState::Idle,
            store: LogStore::new(),
            connection: None,
            next_conn: 0,
            resume_from: None,
            connector,
            events_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn selection(&self) -> Option<&AccountSelection> {
        self.selection.as_ref()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Change the active selection.
    ///
    /// Selecting the identity already backing the live connection keeps that
    /// connection and only refreshes the label. Any other change tears down
    /// the old connection before opening the new one, so exactly one handle
    /// is live at any instant. `None` tears down and goes idle.
    pub fn select(&mut self, selection: Option<AccountSelection>) {
        let Some(selection) = selection else {
            self.resume_from = None;
            self.teardown();
            self.selection = None;
            self.state = ConnectionState::Idle;
            return;
        };

        let same_identity = self
            .selection
            .as_ref()
            .is_some_and(|current| current.address == selection.address);
        if same_identity && self.connection.is_some() {
            self.selection = Some(selection);
            return;
        }

        self.resume_from = None;
        self.teardown();

        let conn = self.mint_conn();
        tracing::debug!(identity = %selection.address, %conn, "opening debug stream");
        let handle = self
            .connector
            .connect(&selection.address, conn, self.events_tx.clone());
        self.connection = Some(handle);
        self.selection = Some(selection);
        self.state = ConnectionState::Idle;
    }

    /// Select a previously-active identity and arm a one-shot history fetch
    /// for when its connection opens
    pub fn restore(&mut self, selection: AccountSelection) {
        let identity = selection.address.clone();
        self.select(Some(selection));
        self.resume_from = Some(identity);
    }

    /// Take a selection pushed from outside the session. Only an identity
    /// different from the current one is imported; `None` and same-identity
    /// publishes are ignored.
    pub fn import(&mut self, selection: Option<AccountSelection>) {
        let Some(selection) = selection else {
            return;
        };
        let differs = self
            .selection
            .as_ref()
            .is_none_or(|current| current.address != selection.address);
        if differs {
            self.select(Some(selection));
        }
    }

    /// Drop the transcript. The connection is untouched.
    pub fn clear_log(&mut self) {
        self.store.clear();
    }

    /// Apply one connection event.
    ///
    /// A binary frame is a protocol violation and comes back as an error;
    /// everything else at most appends records and updates state.
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<EventOutcome, StreamError> {
        let SessionEvent { conn, event } = event;
        let mut outcome = EventOutcome::default();

        // A replaced connection keeps emitting until its task notices the
        // cancellation; its events must not touch the live session.
        let Some(connection) = self.connection.as_ref().filter(|handle| handle.id() == conn)
        else {
            tracing::debug!(%conn, "discarding event from replaced connection");
            return Ok(outcome);
        };
        let identity = connection.identity().clone();

        match event {
            ConnectionEvent::Opened => {
                self.state = ConnectionState::Opened;
                self.store.clear();
                let opened = LogRecord::new(
                    LogKind::Success,
                    format!("Debug stream opened for account {identity}"),
                );
                outcome.appended.push(self.store.append(opened));

                // A restored identity pulls history exactly once, floored at
                // the newest record present when the request is created
                if self.resume_from.take().is_some() {
                    outcome.backfill = Some(BackfillRequest {
                        conn,
                        identity,
                        since: self.store.last_timestamp(),
                    });
                }
            }
            ConnectionEvent::Message(WireMessage::Text(text)) => {
                if let Some(record) = self.ingest_line(&text) {
                    outcome.appended.push(record);
                }
            }
            ConnectionEvent::Message(WireMessage::Binary(bytes)) => {
                return Err(StreamError::UnexpectedBinary(bytes.len()));
            }
            ConnectionEvent::Error(reason) => {
                tracing::warn!(%identity, %reason, "debug stream error");
                let record = LogRecord::new(LogKind::Error, CONNECTION_TROUBLE);
                outcome.appended.push(self.store.append(record));
            }
            ConnectionEvent::Closed(code) => {
                tracing::debug!(%identity, code, "debug stream closed");
                let record = LogRecord::new(
                    LogKind::Error,
                    format!("Connection was closed. [code: {code}]"),
                );
                outcome.appended.push(self.store.append(record));
                self.state = ConnectionState::Closed;
                self.selection = None;
                self.connection = None;
            }
        }

        Ok(outcome)
    }

    /// Merge fetched history into the store.
    ///
    /// The request carries the generation and identity captured when it was
    /// created; a result arriving after the connection was replaced is
    /// dropped whole. Entries below the floor are skipped, the rest pass
    /// through the same parse and filter path as live lines.
    pub fn apply_backfill(
        &mut self,
        request: &BackfillRequest,
        entries: Vec<BackfillEntry>,
    ) -> EventOutcome {
        let mut outcome = EventOutcome::default();

        let current = self.connection.as_ref().is_some_and(|handle| {
            handle.id() == request.conn && *handle.identity() == request.identity
        });
        if !current {
            tracing::debug!(
                conn = %request.conn,
                identity = %request.identity,
                "discarding backfill result for replaced connection"
            );
            return outcome;
        }

        for entry in entries {
            if request.since.is_some_and(|floor| entry.time < floor) {
                continue;
            }
            if let Some(record) = self.ingest_line(&entry.raw) {
                outcome.appended.push(record);
            }
        }
        outcome
    }

    /// Parse one raw line and append it, unless it is empty or internal
    /// builder noise
    fn ingest_line(&self, raw: &str) -> Option<ArcLogRecord> {
        let line = LogParser::parse(raw)?;
        if is_internal_noise(line.payload.as_ref()) {
            return None;
        }
        Some(self.store.append(line.into_record(LogKind::Plain)))
    }

    fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(conn = %connection.id(), "tearing down debug stream connection");
            connection.shutdown();
        }
    }

    fn mint_conn(&mut self) -> ConnId {
        self.next_conn += 1;
        ConnId::new(self.next_conn)
    }
}
