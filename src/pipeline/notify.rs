// src/pipeline/notify.rs

//! Notification dispatch.
//!
//! Filters records through the whitelist, renders one message per event
//! kind and hands it to a `Notifier`. Delivery failures are logged and never
//! stop the cycle.

use std::process::Stdio;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{EventKind, EventRecord, Whitelist};

/// Delivers a rendered notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<()>;
}

/// Runs an external command without a shell.
///
/// In every argument `%s` becomes the subject and `%m` the message.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    argv: Vec<String>,
}

impl CommandNotifier {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(AppError::config("notification command is empty"));
        }
        Ok(Self { argv })
    }

    /// Arguments after substitution, program first.
    pub fn command_line(&self, subject: &str, message: &str) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| substitute(arg, subject, message))
            .collect()
    }
}

/// Single pass so a `%m` inside the subject is left alone.
fn substitute(arg: &str, subject: &str, message: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek() {
                Some('s') => {
                    out.push_str(subject);
                    chars.next();
                    continue;
                }
                Some('m') => {
                    out.push_str(message);
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<()> {
        let args = self.command_line(subject, message);
        let Some((program, rest)) = args.split_first() else {
            return Err(AppError::config("notification command is empty"));
        };

        log::debug!("Running notification command {}", program);
        let status = tokio::process::Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| AppError::delivery(format!("failed to run '{program}': {e}")))?;

        if !status.success() {
            return Err(AppError::delivery(format!("'{program}' exited with {status}")));
        }
        Ok(())
    }
}

/// Result of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Nothing passed the whitelist
    Nothing,
    Sent { records: usize },
    Failed { records: usize },
}

/// Applies the whitelist and renders messages for one monitor.
pub struct Dispatcher {
    notifier: Box<dyn Notifier>,
    failure_notifier: Option<Box<dyn Notifier>>,
    whitelist: Whitelist,
    /// Subcommand name, shown in subjects as `[devart {name}]`
    name: String,
}

impl Dispatcher {
    pub fn new(notifier: Box<dyn Notifier>, whitelist: Whitelist, name: impl Into<String>) -> Self {
        Self {
            notifier,
            failure_notifier: None,
            whitelist,
            name: name.into(),
        }
    }

    /// Also report failed cycles through `notifier`.
    pub fn with_failure_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.failure_notifier = Some(notifier);
        self
    }

    pub fn subject(&self, text: &str) -> String {
        format!("[devart {}] {}", self.name, text)
    }

    /// Records the whitelist lets through.
    pub fn included<'a>(&self, kind: EventKind, records: &'a [EventRecord]) -> Vec<&'a EventRecord> {
        records
            .iter()
            .filter(|r| {
                let allowed = self.whitelist.allows(kind, &r.author);
                if !allowed {
                    log::debug!("{} {} from {} not whitelisted", kind, r.id, r.author);
                }
                allowed
            })
            .collect()
    }

    /// Send one message covering `records`; failures are logged, not returned.
    pub async fn dispatch(&self, kind: EventKind, records: &[EventRecord]) -> Dispatched {
        let included = self.included(kind, records);
        if included.is_empty() {
            return Dispatched::Nothing;
        }

        let subject = self.subject(kind.subject());
        let message = render(kind, &included);
        match self.notifier.notify(&subject, &message).await {
            Ok(()) => {
                log::info!("Notified {} {}", included.len(), kind);
                Dispatched::Sent {
                    records: included.len(),
                }
            }
            Err(e) => {
                log::error!("Unable to notify {} {}: {}", included.len(), kind, e);
                Dispatched::Failed {
                    records: included.len(),
                }
            }
        }
    }

    /// Best-effort report of a failed cycle.
    pub async fn report_failure(&self, error: &AppError) {
        let Some(notifier) = &self.failure_notifier else {
            return;
        };
        let subject = self.subject("Error");
        if let Err(e) = notifier.notify(&subject, &error.to_string()).await {
            log::error!("Failure command failed: {}", e);
        }
    }
}

/// Render the message body for a batch of records of one kind.
pub fn render(kind: EventKind, records: &[&EventRecord]) -> String {
    match kind {
        EventKind::Comments | EventKind::Replies => render_comments(records),
        EventKind::UnreadNotes => render_notes(records),
        EventKind::Deviations => render_deviations(records),
        EventKind::SentNotes => render_sent_notes(records),
    }
}

/// Grouped under the deviation commented on.
fn render_comments(records: &[&EventRecord]) -> String {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        (&a.context, a.timestamp, &a.author, &a.body).cmp(&(&b.context, b.timestamp, &b.author, &b.body))
    });

    let mut lines = Vec::new();
    let mut current: Option<&str> = None;
    for record in sorted {
        if current != Some(record.context.as_str()) {
            lines.push(format!("\nOn {}:\n", record.context));
            current = Some(&record.context);
        }
        lines.push(format!(
            "{} posted:\n{}",
            record.author,
            record.body.as_deref().unwrap_or("")
        ));
    }
    lines.join("\n").trim_start().to_string()
}

/// Grouped by sender.
fn render_notes(records: &[&EventRecord]) -> String {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| (&a.author, &a.context).cmp(&(&b.author, &b.context)));
    grouped(sorted, |author| format!("\n{author} sent:\n"))
}

/// Grouped by owner, case-insensitively sorted.
fn render_deviations(records: &[&EventRecord]) -> String {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| (r.author.to_lowercase(), r.context.to_lowercase()));
    grouped(sorted, |author| format!("\n{author}:\n"))
}

fn grouped(sorted: Vec<&EventRecord>, heading: impl Fn(&str) -> String) -> String {
    let mut lines = Vec::new();
    let mut current: Option<&str> = None;
    for record in sorted {
        if current != Some(record.author.as_str()) {
            lines.push(heading(&record.author));
            current = Some(&record.author);
        }
        lines.push(record.context.clone());
    }
    lines.join("\n").trim_start().to_string()
}

fn render_sent_notes(records: &[&EventRecord]) -> String {
    let mut parts = vec!["The following sent notes have now been read:".to_string()];
    parts.extend(records.iter().map(|r| {
        format!("'{}' sent to {} on {}", r.context, r.author, r.local_time())
    }));
    parts.join("\n\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every notification instead of delivering it.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<(String, String)>>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, subject: &str, message: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), message.to_string()));
            if self.fail {
                Err(AppError::delivery("exit status 1"))
            } else {
                Ok(())
            }
        }
    }

    fn record(kind: EventKind, id: &str, author: &str, context: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            kind,
            timestamp: 1_700_000_000,
            author: author.to_string(),
            context: context.to_string(),
            url: None,
            body: Some(format!("body {id}")),
            unread: None,
        }
    }

    #[test]
    fn test_substitution() {
        let notifier = CommandNotifier::new(vec![
            "mail".into(),
            "-s".into(),
            "%s".into(),
            "me@example.com".into(),
            "--".into(),
            "%m".into(),
        ])
        .unwrap();
        let line = notifier.command_line("[devart check] New Comments", "Alice posted:\nhi");
        assert_eq!(
            line,
            vec![
                "mail",
                "-s",
                "[devart check] New Comments",
                "me@example.com",
                "--",
                "Alice posted:\nhi"
            ]
        );
    }

    #[test]
    fn test_substitution_is_single_pass() {
        assert_eq!(substitute("%s|%m", "50%m off", "msg"), "50%m off|msg");
        assert_eq!(substitute("100%", "s", "m"), "100%");
        assert_eq!(substitute("%x%s", "S", "M"), "%xS");
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandNotifier::new(vec![]).is_err());
        assert!(CommandNotifier::new(vec![" ".into()]).is_err());
    }

    #[tokio::test]
    async fn test_command_failure_is_delivery_error() {
        let notifier = CommandNotifier::new(vec!["false".into()]).unwrap();
        let err = notifier.notify("s", "m").await.unwrap_err();
        assert!(matches!(err, AppError::NotificationDelivery(_)));

        let missing = CommandNotifier::new(vec!["/nonexistent/devart-notify".into()]).unwrap();
        let err = missing.notify("s", "m").await.unwrap_err();
        assert!(matches!(err, AppError::NotificationDelivery(_)));
    }

    #[tokio::test]
    async fn test_command_success() {
        let notifier = CommandNotifier::new(vec!["true".into(), "%s".into(), "%m".into()]).unwrap();
        assert!(notifier.notify("subject", "message").await.is_ok());
    }

    #[tokio::test]
    async fn test_whitelist_suppresses_other_authors() {
        let notifier = RecordingNotifier::default();
        let whitelist = Whitelist::new().with_rule(EventKind::Comments, ["Alice"]);
        let dispatcher = Dispatcher::new(Box::new(notifier.clone()), whitelist, "check");

        let bob = vec![record(EventKind::Comments, "1", "Bob", "Sunset")];
        assert_eq!(
            dispatcher.dispatch(EventKind::Comments, &bob).await,
            Dispatched::Nothing
        );
        assert!(notifier.messages().is_empty());

        // No rule for replies: everyone gets through
        assert_eq!(
            dispatcher.dispatch(EventKind::Replies, &bob).await,
            Dispatched::Sent { records: 1 }
        );

        let alice = vec![
            record(EventKind::Comments, "2", "Alice", "Sunset"),
            record(EventKind::Comments, "3", "Bob", "Sunset"),
        ];
        assert_eq!(
            dispatcher.dispatch(EventKind::Comments, &alice).await,
            Dispatched::Sent { records: 1 }
        );
        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].0, "[devart check] New Comments");
        assert!(messages[1].1.contains("Alice posted"));
        assert!(!messages[1].1.contains("Bob"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported_not_raised() {
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let dispatcher = Dispatcher::new(Box::new(notifier), Whitelist::new(), "check");
        let records = vec![record(EventKind::Deviations, "1", "Carol", "Forest")];
        assert_eq!(
            dispatcher.dispatch(EventKind::Deviations, &records).await,
            Dispatched::Failed { records: 1 }
        );
    }

    #[tokio::test]
    async fn test_failure_report_uses_failure_notifier() {
        let main = RecordingNotifier::default();
        let failure = RecordingNotifier::default();
        let dispatcher = Dispatcher::new(Box::new(main.clone()), Whitelist::new(), "sent-notes")
            .with_failure_notifier(Box::new(failure.clone()));

        dispatcher
            .report_failure(&AppError::upstream("Notes;display_folder", "HTTP 503"))
            .await;
        assert!(main.messages().is_empty());
        let sent = failure.messages();
        assert_eq!(sent[0].0, "[devart sent-notes] Error");
        assert!(sent[0].1.contains("HTTP 503"));
    }

    #[test]
    fn test_render_comments_grouped_by_context() {
        let a = record(EventKind::Comments, "1", "Bob", "Sunset");
        let b = record(EventKind::Comments, "2", "Alice", "Forest");
        let c = record(EventKind::Comments, "3", "Alice", "Sunset");
        let text = render(EventKind::Comments, &[&a, &b, &c]);
        assert_eq!(
            text,
            "On Forest:\n\nAlice posted:\nbody 2\n\nOn Sunset:\n\nAlice posted:\nbody 3\nBob posted:\nbody 1"
        );
    }

    #[test]
    fn test_render_notes_grouped_by_sender() {
        let a = record(EventKind::UnreadNotes, "1", "Bob", "Re: prints");
        let b = record(EventKind::UnreadNotes, "2", "Alice", "Hello");
        let c = record(EventKind::UnreadNotes, "3", "Bob", "Commission");
        let text = render(EventKind::UnreadNotes, &[&a, &b, &c]);
        assert_eq!(
            text,
            "Alice sent:\n\nHello\n\nBob sent:\n\nCommission\nRe: prints"
        );
    }

    #[test]
    fn test_render_deviations_case_insensitive() {
        let a = record(EventKind::Deviations, "1", "carol", "beta");
        let b = record(EventKind::Deviations, "2", "Bob", "Alpha");
        let c = record(EventKind::Deviations, "3", "carol", "Alpha");
        let text = render(EventKind::Deviations, &[&a, &b, &c]);
        assert_eq!(text, "Bob:\n\nAlpha\n\ncarol:\n\nAlpha\nbeta");
    }

    #[test]
    fn test_render_sent_notes() {
        let mut note = record(EventKind::SentNotes, "1", "Bob", "Invoice");
        note.unread = Some(false);
        let text = render(EventKind::SentNotes, &[&note]);
        assert!(text.starts_with("The following sent notes have now been read:\n\n'Invoice' sent to Bob on "));
    }
}
