//! Session import and diagnostics.
//!
//! The agent authenticates by replaying cookies exported from a logged-in
//! browser. Two on-disk formats are accepted:
//!
//! - `cookies.json`: an array of cookie records (the format produced by
//!   devtools-based export tools)
//! - `cookies.txt`: a raw `Cookie:` request-header string, converted into
//!   records on first use
//!
//! The core treats the loaded records as an opaque capability and hands them
//! to the content source at setup. [`audit`] implements the standalone
//! diagnostic checks exposed by the `check-session` subcommand.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Cookie names that carry the forum's authentication state. A session
/// without any of these will not log in.
pub const AUTH_COOKIE_NAMES: &[&str] = &["_t", "_forum_session", "cf_clearance"];

/// SameSite attribute of a cookie record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    #[serde(alias = "strict")]
    Strict,
    #[default]
    #[serde(alias = "lax")]
    Lax,
    #[serde(alias = "none", alias = "no_restriction")]
    None,
}

/// One imported cookie record.
///
/// Field names follow the JSON export format, so a file produced by the
/// browser-side export flow round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    #[serde(rename = "httpOnly")]
    pub http_only: bool,
    #[serde(rename = "sameSite", default)]
    pub same_site: SameSite,
    /// Expiry in seconds since the epoch; absent for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// Errors raised while loading or converting a session.
///
/// All of these are fatal at startup when cookie login is requested.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cookies file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read cookies file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse cookies file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("No usable cookies in {0}")]
    Empty(PathBuf),
}

/// Load cookie records from a JSON export file.
pub fn load(path: &Path) -> Result<Vec<Cookie>, SessionError> {
    if !path.exists() {
        return Err(SessionError::NotFound(path.to_path_buf()));
    }

    let data = fs::read_to_string(path).map_err(|e| SessionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let cookies: Vec<Cookie> = serde_json::from_str(&data).map_err(|e| SessionError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    if cookies.is_empty() {
        return Err(SessionError::Empty(path.to_path_buf()));
    }

    info!("Loaded {} cookies from {}", cookies.len(), path.display());
    Ok(cookies)
}

/// Convert a raw `Cookie:` header string into records.
///
/// Malformed fragments (no `=`, empty name or value) are skipped. Values
/// containing `=` are preserved whole. The defaults match what the original
/// export flow writes: dot-prefixed domain, root path, secure, not HttpOnly,
/// SameSite Lax.
pub fn from_header_string(raw: &str, domain: &str) -> Vec<Cookie> {
    raw.split(';')
        .filter_map(|fragment| {
            let fragment = fragment.trim();
            let (name, value) = fragment.split_once('=')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.to_string(),
                domain: domain.to_string(),
                path: "/".to_string(),
                secure: true,
                http_only: false,
                same_site: SameSite::Lax,
                expires: None,
            })
        })
        .collect()
}

/// Load `cookies.json`, falling back to converting `cookies.txt` when the
/// JSON file does not exist yet. A successful conversion is written back to
/// the JSON path so later runs skip the conversion.
pub fn load_or_convert(
    json_path: &Path,
    txt_path: &Path,
    domain: &str,
) -> Result<Vec<Cookie>, SessionError> {
    if json_path.exists() {
        return load(json_path);
    }

    if !txt_path.exists() {
        return Err(SessionError::NotFound(json_path.to_path_buf()));
    }

    info!(
        "{} not found, converting {}",
        json_path.display(),
        txt_path.display()
    );

    let raw = fs::read_to_string(txt_path).map_err(|e| SessionError::Io {
        path: txt_path.to_path_buf(),
        source: e,
    })?;

    let cookies = from_header_string(&raw, domain);
    if cookies.is_empty() {
        return Err(SessionError::Empty(txt_path.to_path_buf()));
    }

    let json = serde_json::to_string_pretty(&cookies).map_err(|e| SessionError::Parse {
        path: json_path.to_path_buf(),
        source: e,
    })?;
    fs::write(json_path, json).map_err(|e| SessionError::Io {
        path: json_path.to_path_buf(),
        source: e,
    })?;

    info!(
        "Converted {} cookies to {}",
        cookies.len(),
        json_path.display()
    );
    Ok(cookies)
}

/// One problem found while auditing a cookie set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    /// The record's domain does not cover the target site.
    WrongDomain { name: String, domain: String },
    /// The record is not marked secure on an HTTPS-only site.
    NotSecure { name: String },
    /// None of the authentication-critical cookie names are present.
    MissingAuthCookies,
}

impl std::fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditFinding::WrongDomain { name, domain } => {
                write!(f, "cookie {} has domain {} outside the target site", name, domain)
            }
            AuditFinding::NotSecure { name } => {
                write!(f, "cookie {} is not marked secure", name)
            }
            AuditFinding::MissingAuthCookies => {
                write!(
                    f,
                    "no authentication cookies found ({}); export while logged in",
                    AUTH_COOKIE_NAMES.join(", ")
                )
            }
        }
    }
}

/// Result of auditing a cookie set against the target site.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub findings: Vec<AuditFinding>,
    pub auth_cookies: Vec<String>,
}

impl AuditReport {
    pub fn has_issues(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Check a cookie set for the problems that most often break cookie login:
/// wrong domain scope, missing `secure` flags, and absent auth cookies.
pub fn audit(cookies: &[Cookie], site_domain: &str) -> AuditReport {
    let bare = site_domain.trim_start_matches('.');
    let mut report = AuditReport::default();

    for cookie in cookies {
        let cookie_bare = cookie.domain.trim_start_matches('.');
        let in_scope = cookie_bare == bare || cookie_bare.ends_with(&format!(".{}", bare));
        if !in_scope {
            report.findings.push(AuditFinding::WrongDomain {
                name: cookie.name.clone(),
                domain: cookie.domain.clone(),
            });
        }

        if !cookie.secure {
            report.findings.push(AuditFinding::NotSecure {
                name: cookie.name.clone(),
            });
        }

        if AUTH_COOKIE_NAMES.iter().any(|n| cookie.name.contains(n)) {
            debug!("Found auth cookie {}", cookie.name);
            report.auth_cookies.push(cookie.name.clone());
        }
    }

    if report.auth_cookies.is_empty() {
        report.findings.push(AuditFinding::MissingAuthCookies);
    }

    report
}
