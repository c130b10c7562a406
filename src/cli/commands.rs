use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::Result;
use crate::config::Config;
use crate::pacing::Pacer;
use crate::reader::{RunSummary, Scheduler};
use crate::session::{self, Cookie};
use crate::source::ChromeSource;

/// Discover a backlog and read through it until empty or cancelled.
pub async fn run(config: &Config, cancel: CancellationToken) -> Result<RunSummary> {
    let started = Local::now();
    let cookies = load_session(config)?;

    let source = ChromeSource::launch(config, cookies.as_deref().unwrap_or(&[])).await?;
    let pacer = Pacer::new(cancel);

    source.open_listing().await?;
    settle_login(config, &source, &pacer, cookies.is_some()).await?;

    let summary = Scheduler::new(&source, &pacer, config).run().await?;

    info!(
        "Run finished after {}s: {} discovered, {} completed, {} not found, \
         {} deferred, {} failed, {} stalled, {} units read, {} engagements",
        (Local::now() - started).num_seconds(),
        summary.discovered,
        summary.completed,
        summary.not_found,
        summary.deferred,
        summary.failed,
        summary.stalled,
        summary.units_read,
        summary.engagements
    );
    if summary.cancelled {
        info!("Stopped early on cancellation");
    }

    source.shutdown().await;
    Ok(summary)
}

/// Load and audit session cookies. A malformed file is fatal; audit
/// findings are warnings only.
fn load_session(config: &Config) -> Result<Option<Vec<Cookie>>> {
    if !config.session.use_cookies {
        return Ok(None);
    }

    let cookies = session::load_or_convert(
        &config.session.cookies_file,
        &config.session.cookies_txt_file,
        &config.site.cookie_domain(),
    )?;

    let report = session::audit(&cookies, &config.site.cookie_domain());
    for finding in &report.findings {
        warn!("Session audit: {}", finding);
    }

    Ok(Some(cookies))
}

/// Give the site a moment to pick up the session, then check the login
/// state. A rejected session falls back to an extended window in which a
/// person can log in by hand; the run proceeds either way.
async fn settle_login(
    config: &Config,
    source: &ChromeSource,
    pacer: &Pacer,
    used_cookies: bool,
) -> Result<()> {
    if !used_cookies {
        info!(
            "Cookie login disabled; waiting {}ms for manual login",
            config.session.manual_login_wait_ms
        );
        return pacer.pause(config.session.manual_login_wait()).await;
    }

    pacer.pause(config.session.login_verify_wait()).await?;

    if source.is_logged_in().await? {
        info!("Session accepted, logged in");
        return Ok(());
    }

    warn!("Session was not accepted; cookies may be expired or mis-scoped");
    info!(
        "Waiting {}ms for manual login before proceeding",
        config.session.manual_login_wait_ms
    );
    pacer.pause(config.session.manual_login_wait()).await
}

/// Audit the cookies file and report what a run would see.
pub fn check_session(config: &Config) -> Result<()> {
    let domain = config.site.cookie_domain();
    let cookies = session::load_or_convert(
        &config.session.cookies_file,
        &config.session.cookies_txt_file,
        &domain,
    )?;

    info!(
        "{} cookies in {}",
        cookies.len(),
        config.session.cookies_file.display()
    );
    for cookie in &cookies {
        info!(
            "  {} (domain {}, path {}, secure {}, httpOnly {})",
            cookie.name, cookie.domain, cookie.path, cookie.secure, cookie.http_only
        );
    }

    let report = session::audit(&cookies, &domain);
    if report.has_issues() {
        for finding in &report.findings {
            warn!("{}", finding);
        }
    } else {
        info!(
            "Session looks usable; auth cookies present: {}",
            report.auth_cookies.join(", ")
        );
    }

    Ok(())
}
