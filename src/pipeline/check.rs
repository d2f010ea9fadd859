// src/pipeline/check.rs

//! Message checker: new comments, replies, unread notes and watched
//! deviations since the previous cycle.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{EventKind, MonitorState, Snapshot};
use crate::pipeline::diff::DiffCalculator;
use crate::pipeline::monitor::PollCycle;
use crate::pipeline::notify::Dispatcher;
use crate::services::MessageSource;
use crate::storage::SnapshotStore;

pub struct MessageChecker<C, S> {
    client: C,
    store: S,
    dispatcher: Dispatcher,
    diff: DiffCalculator,
}

impl<C, S> MessageChecker<C, S>
where
    C: MessageSource,
    S: SnapshotStore,
{
    pub fn new(client: C, store: S, dispatcher: Dispatcher) -> Self {
        Self {
            client,
            store,
            dispatcher,
            diff: DiffCalculator::additions_only(),
        }
    }

    /// Fetch every kind, then notify what is new and record what was seen.
    pub async fn check(&mut self) -> Result<()> {
        self.client.ensure_logged_in().await?;

        let mut fetched = self.client.fetch_messages().await?;

        let previous = self.store.load().await?;
        let mut next = MonitorState::new();

        for kind in EventKind::MESSAGES {
            let records = fetched.remove(&kind).unwrap_or_default();
            let diff = self.diff.calculate(&previous.snapshot(kind), &records);
            if diff.has_changes() {
                log::debug!("{}: {} change(s) since last cycle", kind, diff.change_count());
            }
            if !diff.added.is_empty() {
                log::info!("{} new {}", diff.added.len(), kind);
                self.dispatcher.dispatch(kind, &diff.added).await;
            }
            next.snapshots.insert(kind, Snapshot::from_records(&records));
        }

        self.store.save(&next).await
    }
}

#[async_trait]
impl<C, S> PollCycle for MessageChecker<C, S>
where
    C: MessageSource,
    S: SnapshotStore,
{
    fn name(&self) -> &str {
        "check"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        self.check().await
    }

    async fn recover(&mut self, error: &AppError) {
        self.client.invalidate();
        self.dispatcher.report_failure(error).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::{EventRecord, Whitelist};
    use crate::pipeline::notify::tests::RecordingNotifier;
    use crate::services::{DeviationSource, FeedbackSource, NoteSource, Session};
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    /// Site stand-in serving canned records per kind.
    #[derive(Default)]
    pub(crate) struct FakeSite {
        pub records: BTreeMap<EventKind, Vec<EventRecord>>,
        pub logins: usize,
        pub logged_in: bool,
        pub fail_with: Option<fn() -> AppError>,
    }

    impl FakeSite {
        fn take(&self, kind: EventKind) -> Result<Vec<EventRecord>> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(self.records.get(&kind).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl Session for FakeSite {
        async fn login(&mut self) -> Result<()> {
            self.logins += 1;
            self.logged_in = true;
            Ok(())
        }

        fn is_logged_in(&self) -> bool {
            self.logged_in
        }

        fn invalidate(&mut self) {
            self.logged_in = false;
        }
    }

    #[async_trait]
    impl FeedbackSource for FakeSite {
        async fn fetch_comments(&mut self) -> Result<Vec<EventRecord>> {
            self.take(EventKind::Comments)
        }

        async fn fetch_replies(&mut self) -> Result<Vec<EventRecord>> {
            self.take(EventKind::Replies)
        }
    }

    #[async_trait]
    impl NoteSource for FakeSite {
        async fn fetch_unread_notes(&mut self) -> Result<Vec<EventRecord>> {
            self.take(EventKind::UnreadNotes)
        }

        async fn fetch_sent_notes(&mut self) -> Result<Vec<EventRecord>> {
            self.take(EventKind::SentNotes)
        }
    }

    #[async_trait]
    impl DeviationSource for FakeSite {
        async fn fetch_watched_deviations(&mut self) -> Result<Vec<EventRecord>> {
            self.take(EventKind::Deviations)
        }
    }

    impl MessageSource for FakeSite {}

    pub(crate) fn record(kind: EventKind, id: &str, author: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            kind,
            timestamp: 1_700_000_000,
            author: author.to_string(),
            context: format!("Item {id}"),
            url: None,
            body: Some("nice".to_string()),
            unread: None,
        }
    }

    fn checker(
        site: FakeSite,
        tmp: &TempDir,
        whitelist: Whitelist,
    ) -> (MessageChecker<FakeSite, LocalStorage>, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let dispatcher = Dispatcher::new(Box::new(notifier.clone()), whitelist, "check");
        let store = LocalStorage::new(tmp.path(), "check");
        (MessageChecker::new(site, store, dispatcher), notifier)
    }

    #[tokio::test]
    async fn test_first_cycle_notifies_everything() {
        let tmp = TempDir::new().unwrap();
        let mut site = FakeSite::default();
        site.records.insert(
            EventKind::Comments,
            vec![record(EventKind::Comments, "c1", "Alice")],
        );
        site.records.insert(
            EventKind::Deviations,
            vec![record(EventKind::Deviations, "d1", "Carol")],
        );
        let (mut checker, notifier) = checker(site, &tmp, Whitelist::new());

        checker.check().await.unwrap();
        let subjects: Vec<String> = notifier.messages().into_iter().map(|(s, _)| s).collect();
        assert_eq!(
            subjects,
            vec!["[devart check] New Deviations", "[devart check] New Comments"]
        );
        assert_eq!(checker.client.logins, 1);
    }

    #[tokio::test]
    async fn test_second_cycle_only_reports_additions() {
        let tmp = TempDir::new().unwrap();
        let mut site = FakeSite::default();
        site.records.insert(
            EventKind::Comments,
            vec![record(EventKind::Comments, "c1", "Alice")],
        );
        let (mut checker, notifier) = checker(site, &tmp, Whitelist::new());
        checker.check().await.unwrap();

        // c1 disappears, c2 arrives
        checker.client.records.insert(
            EventKind::Comments,
            vec![record(EventKind::Comments, "c2", "Alice")],
        );
        checker.check().await.unwrap();

        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].1.contains("Item c2"));
        assert!(!messages[1].1.contains("Item c1"));

        // Unchanged fetch notifies nothing
        checker.check().await.unwrap();
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_filtered_items_are_still_recorded() {
        let tmp = TempDir::new().unwrap();
        let mut site = FakeSite::default();
        site.records.insert(
            EventKind::Comments,
            vec![record(EventKind::Comments, "c1", "Bob")],
        );
        let whitelist = Whitelist::new().with_rule(EventKind::Comments, ["Alice"]);
        let (mut checker, notifier) = checker(site, &tmp, whitelist);

        checker.check().await.unwrap();
        assert!(notifier.messages().is_empty());

        let state = LocalStorage::new(tmp.path(), "check").load().await.unwrap();
        assert!(state.snapshot(EventKind::Comments).contains("c1"));
    }

    #[tokio::test]
    async fn test_state_saved_when_delivery_fails() {
        let tmp = TempDir::new().unwrap();
        let mut site = FakeSite::default();
        site.records.insert(
            EventKind::UnreadNotes,
            vec![record(EventKind::UnreadNotes, "n1", "Bob")],
        );
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let dispatcher = Dispatcher::new(Box::new(notifier), Whitelist::new(), "check");
        let mut checker =
            MessageChecker::new(site, LocalStorage::new(tmp.path(), "check"), dispatcher);

        checker.check().await.unwrap();
        let state = LocalStorage::new(tmp.path(), "check").load().await.unwrap();
        assert!(state.snapshot(EventKind::UnreadNotes).contains("n1"));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut site = FakeSite::default();
        site.records.insert(
            EventKind::Comments,
            vec![record(EventKind::Comments, "c1", "Alice")],
        );
        let (mut checker, _notifier) = checker(site, &tmp, Whitelist::new());
        checker.check().await.unwrap();

        checker.client.fail_with = Some(|| AppError::upstream("difi", "HTTP 503"));
        assert!(checker.run_cycle().await.is_err());
        checker
            .recover(&AppError::upstream("difi", "HTTP 503"))
            .await;
        assert!(!checker.client.is_logged_in());

        let state = LocalStorage::new(tmp.path(), "check").load().await.unwrap();
        assert!(state.snapshot(EventKind::Comments).contains("c1"));
    }
}
