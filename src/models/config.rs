//! Application configuration structures.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::EventKind;

/// Shortest poll interval the monitors accept, in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 300;

/// Root application configuration (`config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Where monitor snapshots live
    #[serde(default)]
    pub state: StateConfig,

    /// Message checker (`devart check`)
    #[serde(default)]
    pub check: MonitorConfig,

    /// Unread sent notes checker (`devart sent-notes`)
    #[serde(default)]
    pub sent_notes: MonitorConfig,

    /// Deviations downloader (`devart deviations`)
    #[serde(default)]
    pub deviations: DeviationsConfig,

    /// Notes downloader (`devart notes`)
    #[serde(default)]
    pub notes: NotesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            state: StateConfig::default(),
            check: MonitorConfig::default(),
            sent_notes: MonitorConfig::default(),
            deviations: DeviationsConfig::default(),
            notes: NotesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("No configuration at {}. Using defaults.", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.client.user_agent.trim().is_empty() {
            return Err(AppError::validation("client.user_agent is empty"));
        }
        if self.client.timeout_secs == 0 {
            return Err(AppError::validation("client.timeout_secs must be > 0"));
        }
        url::Url::parse(&self.client.base_url)
            .map_err(|e| AppError::validation(format!("client.base_url: {e}")))?;
        if self.check.parse_failure_limit == 0 || self.sent_notes.parse_failure_limit == 0 {
            return Err(AppError::validation("parse_failure_limit must be > 0"));
        }
        if self.sent_notes.whitelist.has_rules_outside(EventKind::SentNotes) {
            log::warn!("sent_notes.whitelist only applies to the sent_notes key");
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Site root, overridable for testing
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Location of monitor state files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl StateConfig {
    /// Configured directory, or the per-user cache directory.
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(expand_home(dir)),
            None => dirs::cache_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| AppError::config("Cannot determine a cache directory; set state.directory")),
        }
    }
}

/// Settings shared by the long-running monitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between cycle starts, clamped to at least five minutes
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Notification command; `%s` becomes the subject and `%m` the message
    #[serde(default)]
    pub command: Vec<String>,

    /// Optional command run when a cycle fails
    #[serde(default)]
    pub failure_command: Vec<String>,

    /// Consecutive cycles failing with a parse error before giving up
    #[serde(default = "defaults::parse_failure_limit")]
    pub parse_failure_limit: u32,

    /// Per-kind username filters
    #[serde(default)]
    pub whitelist: Whitelist,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            log::warn!(
                "poll_interval_secs = {} is below the minimum; using {}",
                self.poll_interval_secs,
                MIN_POLL_INTERVAL_SECS
            );
        }
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    /// The notification command, which monitors cannot run without.
    pub fn require_command(&self, section: &str) -> Result<&[String]> {
        if self.command.is_empty() {
            return Err(AppError::config(format!(
                "Please configure {section}.command"
            )));
        }
        Ok(&self.command)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::poll_interval(),
            command: Vec::new(),
            failure_command: Vec::new(),
            parse_failure_limit: defaults::parse_failure_limit(),
            whitelist: Whitelist::default(),
        }
    }
}

/// Deviations downloader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationsConfig {
    /// SQLite database file
    #[serde(default = "defaults::deviations_database")]
    pub database_path: PathBuf,
}

impl Default for DeviationsConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::deviations_database(),
        }
    }
}

impl DeviationsConfig {
    pub fn resolved_database_path(&self) -> PathBuf {
        expand_home(&self.database_path)
    }
}

/// Notes downloader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    /// SQLite database file
    #[serde(default = "defaults::notes_database")]
    pub database_path: PathBuf,

    /// Note folders to skip, by id or title
    #[serde(default)]
    pub ignored_folders: Vec<String>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::notes_database(),
            ignored_folders: Vec::new(),
        }
    }
}

impl NotesConfig {
    pub fn resolved_database_path(&self) -> PathBuf {
        expand_home(&self.database_path)
    }
}

/// Notification filter: event kind → usernames of interest.
///
/// A kind without a rule notifies for everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, BTreeSet<String>>",
    into = "BTreeMap<String, BTreeSet<String>>"
)]
pub struct Whitelist {
    rules: BTreeMap<EventKind, BTreeSet<String>>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or extend) the rule for a kind.
    pub fn with_rule<I, S>(mut self, kind: EventKind, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules
            .entry(kind)
            .or_default()
            .extend(users.into_iter().map(Into::into));
        self
    }

    /// Exact match on username; absence of a rule allows everyone.
    pub fn allows(&self, kind: EventKind, author: &str) -> bool {
        match self.rules.get(&kind) {
            Some(users) => users.contains(author),
            None => true,
        }
    }

    pub fn rule(&self, kind: EventKind) -> Option<&BTreeSet<String>> {
        self.rules.get(&kind)
    }

    fn has_rules_outside(&self, kind: EventKind) -> bool {
        self.rules.keys().any(|k| *k != kind)
    }
}

impl TryFrom<BTreeMap<String, BTreeSet<String>>> for Whitelist {
    type Error = AppError;

    fn try_from(raw: BTreeMap<String, BTreeSet<String>>) -> Result<Self> {
        let mut rules = BTreeMap::new();
        for (key, users) in raw {
            rules.insert(key.parse::<EventKind>()?, users);
        }
        Ok(Self { rules })
    }
}

impl From<Whitelist> for BTreeMap<String, BTreeSet<String>> {
    fn from(whitelist: Whitelist) -> Self {
        whitelist
            .rules
            .into_iter()
            .map(|(kind, users)| (kind.as_str().to_string(), users))
            .collect()
    }
}

/// Account credentials (`credentials.toml`), shared by every command.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!(
                "Unable to read credentials from {}: {e}",
                path.display()
            ))
        })?;
        let credentials: Self = toml::from_str(&content)?;
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(AppError::config(format!(
                "Please ensure a username and password are configured in {}",
                path.display()
            )));
        }
        Ok(credentials)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Directory name used under the per-user config/cache/data roots.
pub const APP_DIR: &str = "deviantart-scripts";

/// Default configuration directory.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::APP_DIR;

    pub fn base_url() -> String {
        "https://www.deviantart.com".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; devart-sync/0.1)".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn poll_interval() -> u64 {
        super::MIN_POLL_INTERVAL_SECS
    }
    pub fn parse_failure_limit() -> u32 {
        3
    }

    fn data_file(name: &str) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(name)
    }

    pub fn deviations_database() -> PathBuf {
        data_file("deviations.sqlite")
    }
    pub fn notes_database() -> PathBuf {
        data_file("notes.sqlite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.client.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.client.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn poll_interval_is_clamped() {
        let mut monitor = MonitorConfig::default();
        assert_eq!(monitor.poll_interval(), Duration::from_secs(300));
        monitor.poll_interval_secs = 60;
        assert_eq!(monitor.poll_interval(), Duration::from_secs(300));
        monitor.poll_interval_secs = 900;
        assert_eq!(monitor.poll_interval(), Duration::from_secs(900));
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            [client]
            timeout_secs = 30

            [check]
            poll_interval_secs = 600
            command = ["mail", "-s", "%s", "me@example.com"]
            [check.whitelist]
            comments = ["Alice"]
            deviations = ["Alice", "Carol"]

            [notes]
            database_path = "/tmp/notes.sqlite"
            ignored_folders = ["Sent"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.client.base_url, "https://www.deviantart.com");
        assert_eq!(config.check.poll_interval_secs, 600);
        assert_eq!(config.check.command.len(), 4);
        assert!(config.check.whitelist.allows(EventKind::Comments, "Alice"));
        assert!(!config.check.whitelist.allows(EventKind::Comments, "Bob"));
        assert!(config.check.whitelist.allows(EventKind::Replies, "Bob"));
        assert_eq!(config.notes.ignored_folders, vec!["Sent"]);
        assert!(config.sent_notes.command.is_empty());
    }

    #[test]
    fn partial_downloader_sections_keep_default_paths() {
        let toml = r#"
            [notes]
            ignored_folders = ["Sent"]

            [deviations]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.notes.ignored_folders, vec!["Sent"]);
        assert!(config.notes.database_path.ends_with("deviantart-scripts/notes.sqlite"));
        assert!(
            config
                .deviations
                .database_path
                .ends_with("deviantart-scripts/deviations.sqlite")
        );
    }

    #[test]
    fn unknown_whitelist_kind_is_rejected() {
        let toml = r#"
            [check.whitelist]
            favourites = ["Alice"]
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn require_command_errors_when_missing() {
        let monitor = MonitorConfig::default();
        assert!(matches!(
            monitor.require_command("check"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "me".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn credentials_load_requires_both_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("credentials.toml");
        fs::write(&path, "username = \"me\"\npassword = \"\"\n").unwrap();
        assert!(Credentials::load(&path).is_err());

        fs::write(&path, "username = \"me\"\npassword = \"pw\"\n").unwrap();
        let credentials = Credentials::load(&path).unwrap();
        assert_eq!(credentials.username, "me");
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home(Path::new("/var/lib/x.sqlite")),
            PathBuf::from("/var/lib/x.sqlite")
        );
    }
}
