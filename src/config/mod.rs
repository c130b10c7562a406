//! Configuration management.
//!
//! Configuration is read from `~/.config/skimmer/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is
//! created. Missing fields fall back to defaults, so a partial file is fine.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::reader::engine::ReadPolicy;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub reader: ReaderConfig,
    pub pacing: PacingConfig,
}

/// Target site and the selectors that locate its pieces.
///
/// The defaults target a Discourse forum; other installations mostly need
/// only `base_url` changed, heavily themed ones may need selector tweaks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Root URL of the forum.
    pub base_url: String,
    /// Non-pinned rows in a thread listing.
    pub listing_row_selector: String,
    /// Container that holds a thread's content once loaded.
    pub content_stream_selector: String,
    /// One content unit (post) inside the stream.
    pub content_unit_selector: String,
    /// Marker inside a unit that is present while the unit is unread,
    /// matched relative to the unit.
    pub unread_marker_selector: String,
    /// Element identifying the terminal "not found" page.
    pub not_found_selector: String,
    /// Engagement button inside a unit, matched relative to the unit.
    pub engagement_selector: String,
    /// Any of these matching means the session is logged in.
    pub logged_in_selectors: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://linux.do".to_string(),
            listing_row_selector:
                ".topic-list-body tr.topic-list-item:not(.pinned) a.raw-topic-link".to_string(),
            content_stream_selector: ".post-stream".to_string(),
            content_unit_selector: ".post-stream .topic-post".to_string(),
            unread_marker_selector: ".read-state:not(.read)".to_string(),
            not_found_selector: ".page-not-found-topics .not-found-topic a".to_string(),
            engagement_selector: ".actions button.btn-toggle-reaction-like".to_string(),
            logged_in_selectors: vec![
                ".header-dropdown-toggle.current-user".to_string(),
                ".d-header .current-user".to_string(),
                "#current-user".to_string(),
            ],
        }
    }
}

impl SiteConfig {
    /// Cookie domain for header-string conversion: host with a leading dot.
    pub fn cookie_domain(&self) -> String {
        match url::Url::parse(&self.base_url).ok().and_then(|u| {
            u.host_str().map(|h| format!(".{}", h.trim_start_matches("www.")))
        }) {
            Some(domain) => domain,
            None => self.base_url.clone(),
        }
    }
}

/// Browser launch options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a visible window (default: true).
    pub headless: bool,
    /// User agent presented to the site.
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Optional proxy endpoint.
    pub proxy: Option<ProxyConfig>,
    /// Page load timeout in milliseconds (default: 120000).
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            proxy: None,
            navigation_timeout_ms: 120_000,
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Proxy endpoint plus optional credentials.
///
/// Credentials are embedded into the proxy URL at launch; proxies requiring
/// an auth challenge mid-session are not supported.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Cookie-login behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Log in by replaying exported cookies (default: true).
    pub use_cookies: bool,
    /// Cookie records in JSON export format.
    pub cookies_file: PathBuf,
    /// Raw `Cookie:` header dump, converted when the JSON file is absent.
    pub cookies_txt_file: PathBuf,
    /// How long to wait after navigation before checking login state.
    pub login_verify_wait_ms: u64,
    /// Manual-login window when cookies are absent or rejected.
    pub manual_login_wait_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_cookies: true,
            cookies_file: PathBuf::from("cookies.json"),
            cookies_txt_file: PathBuf::from("cookies.txt"),
            login_verify_wait_ms: 5_000,
            manual_login_wait_ms: 30_000,
        }
    }
}

impl SessionConfig {
    pub fn login_verify_wait(&self) -> Duration {
        Duration::from_millis(self.login_verify_wait_ms)
    }

    pub fn manual_login_wait(&self) -> Duration {
        Duration::from_millis(self.manual_login_wait_ms)
    }
}

/// Read-engine behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// How many threads to harvest from the listing before reading.
    pub target_discovery_count: usize,
    /// Unread-count ceiling above which a thread is deferred for a later
    /// visit instead of paced through (default: 30).
    pub overflow_ceiling: usize,
    /// Independent probability of engaging with each unit read.
    pub engagement_probability: f64,
    /// Unread-detection policy: `counting` or `simple`.
    pub policy: ReadPolicy,
    /// Rounds to wait for a thread's content before giving up.
    /// 0 retries forever.
    pub max_content_wait_rounds: u32,
    /// Consecutive stalled discovery rounds before giving up.
    /// 0 retries forever.
    pub max_stall_rounds: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            target_discovery_count: 20,
            overflow_ceiling: 30,
            engagement_probability: 0.30,
            policy: ReadPolicy::Counting,
            max_content_wait_rounds: 24,
            max_stall_rounds: 20,
        }
    }
}

/// Delays between the agent's actions, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// After each listing scroll during discovery.
    pub scroll_pause_ms: u64,
    /// Per content unit while stepping through a thread.
    pub read_pause_ms: u64,
    /// After navigating to a thread, before reading starts.
    pub post_navigation_pause_ms: u64,
    /// Between polls while waiting for content or unread state.
    pub content_retry_ms: u64,
    /// While waiting for more listing rows to load.
    pub listing_stall_ms: u64,
    /// After a failed navigation, before the next thread.
    pub failure_backoff_ms: u64,
    /// Randomized pause between threads, lower bound.
    pub idle_delay_min_ms: u64,
    /// Randomized pause between threads, upper bound.
    pub idle_delay_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            scroll_pause_ms: 500,
            read_pause_ms: 2_000,
            post_navigation_pause_ms: 5_000,
            content_retry_ms: 5_000,
            listing_stall_ms: 3_000,
            failure_backoff_ms: 3_000,
            idle_delay_min_ms: 1_000,
            idle_delay_max_ms: 4_000,
        }
    }
}

impl PacingConfig {
    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn read_pause(&self) -> Duration {
        Duration::from_millis(self.read_pause_ms)
    }

    pub fn post_navigation_pause(&self) -> Duration {
        Duration::from_millis(self.post_navigation_pause_ms)
    }

    pub fn content_retry(&self) -> Duration {
        Duration::from_millis(self.content_retry_ms)
    }

    pub fn listing_stall(&self) -> Duration {
        Duration::from_millis(self.listing_stall_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn idle_delay_min(&self) -> Duration {
        Duration::from_millis(self.idle_delay_min_ms)
    }

    pub fn idle_delay_max(&self) -> Duration {
        Duration::from_millis(self.idle_delay_max_ms)
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/skimmer/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("skimmer").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let default_config = Self::default_config_content();

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(default_config.as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Skimmer configuration
#
# All values shown are the defaults; any omitted key falls back to them.

[site]
base_url = "https://linux.do"

# Selectors locating the forum's pieces (Discourse defaults)
listing_row_selector = ".topic-list-body tr.topic-list-item:not(.pinned) a.raw-topic-link"
content_stream_selector = ".post-stream"
content_unit_selector = ".post-stream .topic-post"
unread_marker_selector = ".read-state:not(.read)"
not_found_selector = ".page-not-found-topics .not-found-topic a"
engagement_selector = ".actions button.btn-toggle-reaction-like"
logged_in_selectors = [
    ".header-dropdown-toggle.current-user",
    ".d-header .current-user",
    "#current-user",
]

[browser]
# Run without a visible window
headless = true
viewport_width = 1920
viewport_height = 1080
# Page load timeout (milliseconds)
navigation_timeout_ms = 120000

# Proxy example:
# [browser.proxy]
# server = "http://proxy.example.com:8080"
# username = "user"
# password = "pass"

[session]
# Log in by replaying exported cookies
use_cookies = true
cookies_file = "cookies.json"
cookies_txt_file = "cookies.txt"
# How long to wait before checking login state (milliseconds)
login_verify_wait_ms = 5000
# Manual-login window when cookies are absent or rejected (milliseconds)
manual_login_wait_ms = 30000

[reader]
# Threads to harvest from the listing before reading
target_discovery_count = 20
# Unread-count ceiling above which a thread is deferred
overflow_ceiling = 30
# Probability of engaging with each unit read (0.0 - 1.0)
engagement_probability = 0.30
# Unread-detection policy: "counting" tracks unread markers,
# "simple" treats a visible next-thread listing as done
policy = "counting"
# Rounds to wait for thread content before giving up (0 = forever)
max_content_wait_rounds = 24
# Stalled discovery rounds before giving up (0 = forever)
max_stall_rounds = 20

[pacing]
# All values in milliseconds
scroll_pause_ms = 500
read_pause_ms = 2000
post_navigation_pause_ms = 5000
content_retry_ms = 5000
listing_stall_ms = 3000
failure_backoff_ms = 3000
idle_delay_min_ms = 1000
idle_delay_max_ms = 4000
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
