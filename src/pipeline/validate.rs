// src/pipeline/validate.rs

use std::path::Path;

use crate::config::load_all;
use crate::error::Result;
use crate::models::{Config, EventKind, MonitorConfig};
use crate::storage::{LocalStorage, SnapshotStore};

/// Problems that do not stop every command but will stop some.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

/// Validate configuration and credentials, then describe what each command will use.
pub async fn run_validate(config_dir: &Path) -> Result<ValidationReport> {
    log::info!("Validating configuration in {}", config_dir.display());

    let (config, credentials) = match load_all(config_dir) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("Validation failed: {}", e);
            return Err(e);
        }
    };
    log::info!("✓ Credentials for {}", credentials.username);
    log::info!("✓ Config OK");
    log::info!("  base_url: {}", config.client.base_url);
    log::info!("  timeout: {}s", config.client.timeout_secs);

    let mut report = ValidationReport::default();
    let state_dir = config.state.resolve_directory()?;
    log::info!("  state directory: {}", state_dir.display());

    for (name, section, monitor) in monitors(&config) {
        describe_monitor(name, section, monitor, &mut report);
        let state = LocalStorage::new(&state_dir, name);
        match state.load().await {
            Ok(s) if s.is_empty() => log::info!("  {} state: none yet", name),
            Ok(s) => log::info!("  {} state: last updated {}", name, s.updated_at),
            Err(e) => report.warn(format!("{} state at {} is unreadable: {e}", name, state.path().display())),
        }
    }

    log::info!(
        "  deviations database: {}",
        config.deviations.resolved_database_path().display()
    );
    log::info!(
        "  notes database: {}",
        config.notes.resolved_database_path().display()
    );
    if !config.notes.ignored_folders.is_empty() {
        log::info!("  ignored note folders: {}", config.notes.ignored_folders.join(", "));
    }

    if report.warnings.is_empty() {
        log::info!("All validations passed!");
    }
    Ok(report)
}

impl ValidationReport {
    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }
}

fn monitors(config: &Config) -> [(&'static str, &'static str, &MonitorConfig); 2] {
    [
        ("check", "check", &config.check),
        ("sent-notes", "sent_notes", &config.sent_notes),
    ]
}

fn describe_monitor(name: &str, section: &str, monitor: &MonitorConfig, report: &mut ValidationReport) {
    if let Err(e) = monitor.require_command(section) {
        report.warn(format!("{name}: {e}"));
        return;
    }
    log::info!(
        "  {}: every {}s, command '{}'",
        name,
        monitor.poll_interval().as_secs(),
        monitor.command.join(" ")
    );
    if !monitor.failure_command.is_empty() {
        log::info!("  {}: failures reported via '{}'", name, monitor.failure_command.join(" "));
    }
    for kind in [
        EventKind::Comments,
        EventKind::Replies,
        EventKind::UnreadNotes,
        EventKind::Deviations,
        EventKind::SentNotes,
    ] {
        if let Some(users) = monitor.whitelist.rule(kind) {
            log::info!("  {}: {} only from {} user(s)", name, kind, users.len());
        }
    }
}
