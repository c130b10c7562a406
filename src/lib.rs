//! # Skimmer
//!
//! An unattended agent that reads through a discussion forum the way a
//! person would: discover a backlog of threads from the listing, open each
//! one, let the lazily-loaded content materialize, pace through whatever is
//! unread, occasionally leave a reaction, and move on until the backlog is
//! empty.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler → ReadEngine → ContentSource → browser
//!     ↑            ↓
//!  Backlog  ←  discoveries
//! ```
//!
//! The core never touches the browser directly; everything it needs from
//! the platform goes through the [`source::ContentSource`] capability trait,
//! so the whole traversal runs against a scripted in-memory source in tests.
//!
//! All state is in-memory and scoped to a single run; nothing persists.

/// Error types.
///
/// One [`SkimmerError`](app::SkimmerError) enum with a crate-wide `Result`
/// alias. Cancellation travels this channel too, as
/// [`SkimmerError::Cancelled`](app::SkimmerError::Cancelled).
pub mod app;

/// Command-line interface using clap.
///
/// - `run` - discover and read through a backlog
/// - `check-session` - audit the cookies file
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/skimmer/config.toml`, creating a commented default
/// on first run. Covers the target site and its selectors, browser launch
/// options, session files, reader policy, and pacing intervals.
pub mod config;

/// Pacing and cancellation.
///
/// Every timed wait goes through one [`Pacer`](pacing::Pacer) that races
/// the delay against the run's cancellation token.
pub mod pacing;

/// The traversal and read-progress engine.
///
/// - [`Backlog`](reader::Backlog): pending queue plus all-time seen-set
/// - [`DiscoveryPoller`](reader::DiscoveryPoller): harvests the listing
/// - [`ReadEngine`](reader::ReadEngine): per-thread read-state machine
/// - [`Scheduler`](reader::Scheduler): the top-level cooperative loop
pub mod reader;

/// Session import and diagnostics.
///
/// Parses the JSON cookie export format, converts raw `Cookie:` header
/// dumps, and audits cookie sets for the problems that break login.
pub mod session;

/// Content source abstraction.
///
/// - [`ContentSource`](source::ContentSource): capability trait the core
///   drives
/// - [`ChromeSource`](source::ChromeSource): chromiumoxide implementation
pub mod source;
