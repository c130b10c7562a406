//! Scripted in-memory content source for tests.
//!
//! Behavior is declared up front: listing growth batches, per-thread
//! scripts, and viewer-state sequences. Every interaction is recorded so
//! tests can assert on ordering and counts.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::{Result, SkimmerError};
use crate::source::{ContentSource, ListingRow, ViewerState};

/// One scripted poll of a thread's viewer state.
#[derive(Debug, Clone, Default)]
pub(crate) struct View {
    pub total: usize,
    pub unread: Vec<usize>,
}

impl View {
    pub fn new(total: usize, unread: Vec<usize>) -> Self {
        Self { total, unread }
    }
}

/// Scripted behavior for one thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThreadScript {
    /// Navigation to this thread fails.
    pub fail_navigation: bool,
    /// The thread resolves to the terminal not-found page.
    pub not_found: bool,
    /// `has_content` reports false this many times before turning true.
    pub content_delay_polls: u32,
    /// Content never materializes (and the page is not a not-found page).
    pub content_never: bool,
    /// Successive viewer polls; the last entry repeats.
    pub views: Vec<View>,
    /// Listing rows rendered at the thread foot after an end jump.
    pub foot_rows: Vec<ListingRow>,
    /// `focus_unit` on these indices reports the unit missing.
    pub missing_units: Vec<usize>,
}

#[derive(Debug, Default)]
struct State {
    listing: Vec<ListingRow>,
    growth_on_focus: VecDeque<Vec<ListingRow>>,
    growth_on_poll: VecDeque<Vec<ListingRow>>,
    threads: HashMap<String, ThreadScript>,
    current: ThreadScript,
    content_polls_left: u32,
    view_cursor: usize,
    // observation log
    focused_rows: Vec<usize>,
    focused_units: Vec<usize>,
    engaged_units: Vec<usize>,
    navigations: Vec<String>,
    end_jumps: u32,
}

impl State {
    fn view_at(&self, index: usize) -> View {
        if self.current.views.is_empty() {
            return View::default();
        }
        let clamped = index.min(self.current.views.len() - 1);
        self.current.views[clamped].clone()
    }

    /// The view most recently served, or the first one before any poll.
    fn active_view(&self) -> View {
        self.view_at(self.view_cursor.saturating_sub(1))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    state: Mutex<State>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(rows: Vec<ListingRow>) -> Self {
        let source = Self::new();
        source.state.lock().unwrap().listing = rows;
        source
    }

    /// Queue a batch of rows revealed by the next listing-row focus.
    pub fn push_growth_on_focus(&self, batch: Vec<ListingRow>) {
        self.state.lock().unwrap().growth_on_focus.push_back(batch);
    }

    /// Queue a batch of rows that arrives on a later listing poll.
    pub fn push_growth_on_poll(&self, batch: Vec<ListingRow>) {
        self.state.lock().unwrap().growth_on_poll.push_back(batch);
    }

    pub fn script_thread(&self, identifier: &str, script: ThreadScript) {
        self.state
            .lock()
            .unwrap()
            .threads
            .insert(identifier.to_string(), script);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn focused_rows(&self) -> Vec<usize> {
        self.state.lock().unwrap().focused_rows.clone()
    }

    pub fn focused_units(&self) -> Vec<usize> {
        self.state.lock().unwrap().focused_units.clone()
    }

    pub fn engaged_count(&self) -> usize {
        self.state.lock().unwrap().engaged_units.len()
    }

    pub fn end_jumps(&self) -> u32 {
        self.state.lock().unwrap().end_jumps
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn list_items(&self) -> Result<Vec<ListingRow>> {
        let mut state = self.state.lock().unwrap();
        if let Some(batch) = state.growth_on_poll.pop_front() {
            state.listing.extend(batch);
        }
        Ok(state.listing.clone())
    }

    async fn focus_listing_row(&self, index: usize) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.focused_rows.push(index);
        let existed = index < state.listing.len();
        if let Some(batch) = state.growth_on_focus.pop_front() {
            state.listing.extend(batch);
        }
        Ok(existed)
    }

    async fn navigate_to(&self, identifier: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(identifier.to_string());

        let script = state.threads.get(identifier).cloned().unwrap_or_default();
        if script.fail_navigation {
            return Err(SkimmerError::Navigation(format!(
                "scripted failure for {}",
                identifier
            )));
        }

        state.content_polls_left = script.content_delay_polls;
        state.view_cursor = 0;
        state.listing.clear();
        state.current = script;
        Ok(())
    }

    async fn has_content(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.current.content_never || state.current.not_found {
            return Ok(false);
        }
        if state.content_polls_left > 0 {
            state.content_polls_left -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn is_terminal_not_found(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().current.not_found)
    }

    async fn viewer_state(&self) -> Result<ViewerState> {
        let mut state = self.state.lock().unwrap();
        let view = state.view_at(state.view_cursor);
        state.view_cursor += 1;
        Ok(ViewerState {
            total_units: view.total,
            unread_count: view.unread.len(),
        })
    }

    async fn unread_indices(&self) -> Result<Vec<usize>> {
        let state = self.state.lock().unwrap();
        Ok(state.active_view().unread)
    }

    async fn focus_unit(&self, index: usize) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.focused_units.push(index);
        if state.current.missing_units.contains(&index) {
            return Ok(false);
        }
        Ok(index < state.active_view().total)
    }

    async fn jump_to_end(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.end_jumps += 1;
        state.listing = state.current.foot_rows.clone();
        Ok(())
    }

    async fn engage_unit(&self, index: usize) -> Result<()> {
        self.state.lock().unwrap().engaged_units.push(index);
        Ok(())
    }
}
