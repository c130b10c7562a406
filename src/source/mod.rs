//! Content source abstraction.
//!
//! The read engine never touches the browser directly; everything it needs
//! from the remote platform is expressed as the [`ContentSource`] capability
//! surface. [`ChromeSource`] implements it against a real browser, and the
//! test suite drives the core with a scripted in-memory implementation.

pub mod chrome;
#[cfg(test)]
pub(crate) mod scripted;

pub use chrome::ChromeSource;

use async_trait::async_trait;

use crate::app::Result;

/// One row harvested from a thread listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// Stable path-like key for the thread.
    pub identifier: String,
    /// Thread title, for logging.
    pub label: String,
}

impl ListingRow {
    pub fn new(identifier: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
        }
    }
}

/// Snapshot of a thread's content-unit counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerState {
    pub total_units: usize,
    pub unread_count: usize,
}

/// Capabilities the core needs from the remote platform.
///
/// Viewport-focus calls return `Ok(false)` when no element exists at the
/// given index, which the callers treat as "list changed under us" rather
/// than an error.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// All currently visible, non-pinned listing rows, in document order.
    async fn list_items(&self) -> Result<Vec<ListingRow>>;

    /// Focus the viewport on the listing row at `index`, triggering the
    /// platform's lazy load.
    async fn focus_listing_row(&self, index: usize) -> Result<bool>;

    /// Navigate to a thread by its identifier.
    async fn navigate_to(&self, identifier: &str) -> Result<()>;

    /// Whether the thread's content container has materialized.
    async fn has_content(&self) -> Result<bool>;

    /// Whether the current page is the terminal "not found" page.
    async fn is_terminal_not_found(&self) -> Result<bool>;

    /// Current total and unread counts.
    async fn viewer_state(&self) -> Result<ViewerState>;

    /// Indices of unread units, in document order.
    async fn unread_indices(&self) -> Result<Vec<usize>>;

    /// Focus the viewport on the content unit at `index`.
    async fn focus_unit(&self, index: usize) -> Result<bool>;

    /// Force end-of-content navigation, materializing whatever the platform
    /// renders at the foot of the thread.
    async fn jump_to_end(&self) -> Result<()>;

    /// Perform the engagement action on the unit at `index`. A missing
    /// button is not an error.
    async fn engage_unit(&self, index: usize) -> Result<()>;
}
