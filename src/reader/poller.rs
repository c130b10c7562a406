//! Discovery: harvest thread identifiers from a listing view.
//!
//! The platform lazy-loads listing rows as the viewport moves over them, so
//! the poller walks the listing in strides, focusing a row at a time, until
//! enough rows are visible or growth stops.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::Result;
use crate::config::{PacingConfig, ReaderConfig};
use crate::pacing::Pacer;
use crate::source::{ContentSource, ListingRow};

/// Rows skipped between successive viewport focuses. One focus loads a
/// screenful, so focusing every row would be wasted round-trips.
const SCROLL_STRIDE: usize = 5;

/// What discovery produced.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// Visible rows in document order; may overshoot the target.
    pub rows: Vec<ListingRow>,
    /// Growth stopped before the target was reached.
    pub stalled: bool,
}

pub struct DiscoveryPoller<'a> {
    source: &'a dyn ContentSource,
    pacer: &'a Pacer,
    target_count: usize,
    max_stall_rounds: u32,
    scroll_pause: Duration,
    stall_pause: Duration,
}

impl<'a> DiscoveryPoller<'a> {
    pub fn new(
        source: &'a dyn ContentSource,
        pacer: &'a Pacer,
        reader: &'a ReaderConfig,
        pacing: &'a PacingConfig,
    ) -> Self {
        Self {
            source,
            pacer,
            target_count: reader.target_discovery_count,
            max_stall_rounds: reader.max_stall_rounds,
            scroll_pause: pacing.scroll_pause(),
            stall_pause: pacing.listing_stall(),
        }
    }

    /// Walk the listing until `target_count` rows are visible or growth
    /// stalls for too many consecutive rounds.
    pub async fn run(&self) -> Result<DiscoveryOutcome> {
        info!("Discovering threads, target {}", self.target_count);

        let mut view_num = 0usize;
        let mut stalled_rounds = 0u32;

        loop {
            let rows = self.source.list_items().await?;
            debug!("Listing currently shows {} rows", rows.len());

            if rows.len() >= self.target_count {
                info!("Discovered {} threads", rows.len());
                return Ok(DiscoveryOutcome {
                    rows,
                    stalled: false,
                });
            }

            if view_num < rows.len() {
                // A row exists at the cursor: focus it to trigger the next
                // lazy-load batch, then stride on.
                stalled_rounds = 0;
                self.source.focus_listing_row(view_num).await?;
                view_num += SCROLL_STRIDE;
                self.pacer.pause(self.scroll_pause).await?;
            } else {
                stalled_rounds += 1;
                if self.max_stall_rounds > 0 && stalled_rounds >= self.max_stall_rounds {
                    warn!(
                        "Listing stopped growing at {} rows (target {}), giving up",
                        rows.len(),
                        self.target_count
                    );
                    return Ok(DiscoveryOutcome {
                        rows,
                        stalled: true,
                    });
                }
                debug!("No row at {} yet, waiting for the listing to grow", view_num);
                self.pacer.pause(self.stall_pause).await?;
            }
        }
    }
}
