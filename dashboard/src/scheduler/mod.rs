//! Debounced scheduling of lightweight map-only requests.
//!
//! Continuous input (slider drags, range edits) produces a stream of queries.
//! [`DebouncedScheduler`] turns that stream into at most one backend request
//! per quiet period, always for the most recent query, and makes sure only
//! the most recently dispatched request may commit its result.
//!
//! Two counters drive this:
//!
//! - the *scheduled* generation identifies the pending settle timer; every
//!   `schedule` call supersedes the previous timer
//! - the *dispatched* generation numbers requests actually sent; a response
//!   commits only while its number is still the latest

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{AnalysisBackend, GatewayError};
use crate::models::{GeomapSelection, Query};

pub mod generation;

pub use generation::{Generation, MapTicket};

/// Result of a settled map-only request.
#[derive(Debug, Clone)]
pub enum MapOutcome {
    Selection(GeomapSelection),
    /// No county matched the query.
    Empty,
    /// Transport or decode failure. Logged, never alerted.
    Failed(GatewayError),
}

/// Receiver of scheduler events. Implemented by the pattern state machine.
pub trait MapSink: Send + Sync {
    /// Overlap flag changed as part of a `schedule` call.
    fn overlap_changed(&self, overlapping: bool);

    /// A request for `query` is about to be sent.
    fn map_dispatched(&self, ticket: &MapTicket, query: &Query);

    /// A request finished. Implementations must re-check
    /// [`MapTicket::is_current`] and the ticket's epoch under their own lock
    /// before committing.
    fn map_settled(&self, ticket: MapTicket, query: Query, outcome: MapOutcome);
}

/// What a `schedule` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A settle timer was started with this token.
    Scheduled(u64),
    /// Ranges overlap: nothing scheduled, pending timer cancelled.
    Overlap,
    /// No tokio runtime to run the timer on.
    NoRuntime,
}

struct Inner {
    backend: Arc<dyn AnalysisBackend>,
    sink: Arc<dyn MapSink>,
    settle: Duration,
    scheduled: Generation,
    dispatched: Arc<Generation>,
}

/// Coalesces map-only requests to one per settle period.
#[derive(Clone)]
pub struct DebouncedScheduler {
    inner: Arc<Inner>,
}

impl DebouncedScheduler {
    pub fn new(backend: Arc<dyn AnalysisBackend>, sink: Arc<dyn MapSink>, settle: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                sink,
                settle,
                scheduled: Generation::new(),
                dispatched: Arc::new(Generation::new()),
            }),
        }
    }

    pub fn settle(&self) -> Duration {
        self.inner.settle
    }

    /// Fire-and-forget: fetch the map for `query` once input has been quiet
    /// for the settle period. `epoch` is the data epoch the query was built
    /// in and travels on the ticket.
    ///
    /// Overlapping ranges never reach the backend. The overlap flag is
    /// raised before this returns and any pending timer is cancelled.
    pub fn schedule(&self, query: Query, epoch: u64) -> ScheduleOutcome {
        if query.ranges_overlap() {
            self.inner.scheduled.advance();
            self.inner.sink.overlap_changed(true);
            debug!("map-only {} skipped: ranges overlap", query.fingerprint());
            return ScheduleOutcome::Overlap;
        }
        self.inner.sink.overlap_changed(false);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("map-only {} not scheduled: no runtime", query.fingerprint());
                return ScheduleOutcome::NoRuntime;
            }
        };

        let token = self.inner.scheduled.advance();
        let inner = self.inner.clone();
        runtime.spawn(async move {
            tokio::time::sleep(inner.settle).await;
            if !inner.scheduled.is_current(token) {
                debug!("map-only {} superseded before dispatch", query.fingerprint());
                return;
            }
            inner.dispatch(query, epoch).await;
        });
        ScheduleOutcome::Scheduled(token)
    }

    /// Cancel the pending timer and orphan every in-flight request.
    pub fn invalidate(&self) {
        self.inner.scheduled.advance();
        self.inner.dispatched.advance();
    }

    /// Sequence number of the most recently dispatched request.
    pub fn last_dispatched(&self) -> u64 {
        self.inner.dispatched.current()
    }
}

impl Inner {
    async fn dispatch(&self, query: Query, epoch: u64) {
        let ticket = MapTicket::new(self.dispatched.advance(), epoch, self.dispatched.clone());
        self.sink.map_dispatched(&ticket, &query);
        debug!("map-only {} dispatched as #{}", query.fingerprint(), ticket.seq());

        let result = self.backend.fetch_map_only(&query).await;

        if !ticket.is_current() {
            debug!("map-only #{} dropped: superseded", ticket.seq());
            return;
        }

        let outcome = match result {
            Ok(selection) => MapOutcome::Selection(selection),
            Err(err) if err.is_empty_selection() => MapOutcome::Empty,
            Err(err) => {
                warn!("map-only #{} failed: {}", ticket.seq(), err);
                MapOutcome::Failed(err)
            }
        };
        self.sink.map_settled(ticket, query, outcome);
    }
}
