// src/pipeline/sent_notes.rs

//! Sent-notes checker: reports sent notes the recipient has now read.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{EventKind, EventRecord, MonitorState, Snapshot};
use crate::pipeline::diff::DiffCalculator;
use crate::pipeline::monitor::PollCycle;
use crate::pipeline::notify::Dispatcher;
use crate::services::{NoteSource, Session};
use crate::storage::SnapshotStore;

/// Newly read notes and the snapshot to store next.
///
/// Only unread notes are tracked. A note seen read on first sight is
/// never reported.
pub fn advance(previous: &Snapshot, fetched: &[EventRecord]) -> (Vec<EventRecord>, Snapshot) {
    let diff = DiffCalculator::new().calculate(previous, fetched);
    let next = Snapshot::from_records(fetched.iter().filter(|r| r.unread == Some(true)));
    (diff.changed, next)
}

pub struct SentNotesChecker<C, S> {
    client: C,
    store: S,
    dispatcher: Dispatcher,
}

impl<C, S> SentNotesChecker<C, S>
where
    C: Session + NoteSource,
    S: SnapshotStore,
{
    pub fn new(client: C, store: S, dispatcher: Dispatcher) -> Self {
        Self {
            client,
            store,
            dispatcher,
        }
    }

    pub async fn check(&mut self) -> Result<()> {
        self.client.ensure_logged_in().await?;
        let fetched = self.client.fetch_sent_notes().await?;
        log::debug!("Fetched {} sent notes", fetched.len());

        let mut state = self.store.load().await?;
        let previous = state.snapshot(EventKind::SentNotes);
        let (read, next) = advance(&previous, &fetched);

        if !read.is_empty() {
            log::info!("{} sent notes read since last check", read.len());
            self.dispatcher.dispatch(EventKind::SentNotes, &read).await;
        }
        log::debug!("Tracking {} unread sent notes", next.len());

        let mut updated = MonitorState::new();
        updated.snapshots = std::mem::take(&mut state.snapshots);
        updated.snapshots.insert(EventKind::SentNotes, next);
        self.store.save(&updated).await
    }
}

#[async_trait]
impl<C, S> PollCycle for SentNotesChecker<C, S>
where
    C: Session + NoteSource,
    S: SnapshotStore,
{
    fn name(&self) -> &str {
        "sent-notes"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        self.check().await
    }

    async fn recover(&mut self, error: &AppError) {
        self.client.invalidate();
        self.dispatcher.report_failure(error).await;
    }
}
