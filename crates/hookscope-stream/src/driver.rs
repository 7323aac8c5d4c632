use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use hookscope_logs::LogStore;
use hookscope_types::{AccountSelection, ArcLogRecord, ConnectionState};

use crate::backfill::{BackfillClient, BackfillEntry, BackfillRequest};
use crate::connection::{Connector, SessionEvent};
use crate::error::StreamError;
use crate::session::{EventOutcome, StreamSession};

/// Instructions for the stream driver
#[derive(Debug)]
pub enum SessionCommand {
    /// Change the active selection; `None` goes idle
    Select(Option<AccountSelection>),
    /// Select a previously-active identity and pull its recent history
    Restore(AccountSelection),
    /// Drop the transcript, keeping the connection
    ClearLog,
    Shutdown,
}

type FetchResult = (BackfillRequest, Result<Vec<BackfillEntry>, StreamError>);

/// Event pump around a [`StreamSession`].
///
/// Everything that mutates the session funnels through the one `run` loop:
/// commands, externally published selections, connection events, and
/// completed history fetches. Appended records stream out on the record
/// channel and connection state changes on the state watch. The only
/// suspending operation, the history fetch, runs on its own task and
/// delivers its result back into the loop, so the session itself never
/// blocks.
pub struct StreamDriver {
    session: StreamSession,
    backfill: BackfillClient,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    selection_rx: watch::Receiver<Option<AccountSelection>>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    fetches_tx: mpsc::UnboundedSender<FetchResult>,
    fetches_rx: mpsc::UnboundedReceiver<FetchResult>,
    record_tx: mpsc::UnboundedSender<ArcLogRecord>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl StreamDriver {
    pub fn new(
        connector: Arc<dyn Connector>,
        backfill: BackfillClient,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        selection_rx: watch::Receiver<Option<AccountSelection>>,
        record_tx: mpsc::UnboundedSender<ArcLogRecord>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fetches_tx, fetches_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let driver = Self {
            session: StreamSession::new(connector, events_tx),
            backfill,
            commands,
            selection_rx,
            events_rx,
            fetches_tx,
            fetches_rx,
            record_tx,
            state_tx,
            cancel,
        };
        (driver, state_rx)
    }

    /// Clone-shared handle to the session's record store, for collaborators
    /// that read the full transcript instead of tailing the record tap
    pub fn store(&self) -> LogStore {
        self.session.store().clone()
    }

    /// Run until shutdown, cancellation, or a protocol violation.
    ///
    /// The live connection is torn down before returning.
    pub async fn run(mut self) -> Result<(), StreamError> {
        let mut selection_open = true;

        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),

                command = self.commands.recv() => match command {
                    Some(SessionCommand::Select(selection)) => {
                        self.session.select(selection);
                        self.publish_state();
                    }
                    Some(SessionCommand::Restore(selection)) => {
                        self.session.restore(selection);
                        self.publish_state();
                    }
                    Some(SessionCommand::ClearLog) => self.session.clear_log(),
                    Some(SessionCommand::Shutdown) | None => break Ok(()),
                },

                changed = self.selection_rx.changed(), if selection_open => match changed {
                    Ok(()) => {
                        let selection = self.selection_rx.borrow_and_update().clone();
                        self.session.import(selection);
                        self.publish_state();
                    }
                    // Publisher went away; the branch stays off from here on
                    Err(_) => selection_open = false,
                },

                Some(event) = self.events_rx.recv() => {
                    match self.session.handle_event(event) {
                        Ok(outcome) => {
                            self.dispatch(outcome);
                            self.publish_state();
                        }
                        Err(e) => break Err(e),
                    }
                }

                Some((request, fetched)) = self.fetches_rx.recv() => match fetched {
                    Ok(entries) => {
                        let outcome = self.session.apply_backfill(&request, entries);
                        self.dispatch(outcome);
                    }
                    // History is best effort; trouble never becomes a record
                    Err(e) => {
                        tracing::warn!(identity = %request.identity, error = %e, "backfill fetch failed");
                    }
                },
            }
        };

        self.session.select(None);
        self.publish_state();
        result
    }

    /// Forward appended records and start the history fetch when one was
    /// armed
    fn dispatch(&mut self, outcome: EventOutcome) {
        for record in outcome.appended {
            let _ = self.record_tx.send(record);
        }
        if let Some(request) = outcome.backfill {
            self.spawn_fetch(request);
        }
    }

    fn spawn_fetch(&self, request: BackfillRequest) {
        let client = self.backfill.clone();
        let results = self.fetches_tx.clone();
        tokio::spawn(async move {
            let fetched = client.fetch_recent(&request.identity).await;
            let _ = results.send((request, fetched));
        });
    }

    fn publish_state(&self) {
        let current = self.session.state();
        self.state_tx.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
    }
}
