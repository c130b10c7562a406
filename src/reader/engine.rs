//! The read-state machine.
//!
//! Drives one thread from first contact to completion: waits for content to
//! materialize, measures unread state, paces through units with human-like
//! timing, occasionally engages, and harvests the secondary listing the
//! platform renders at the thread foot.
//!
//! State flow: `AwaitingContent → Scanning → {StepThroughUnread |
//! OverflowSkip} → Done`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::config::{PacingConfig, ReaderConfig};
use crate::pacing::Pacer;
use crate::reader::backlog::Item;
use crate::source::{ContentSource, ListingRow};

/// How the engine decides that a thread has been read out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// A visible next-thread listing at the foot means the thread is
    /// exhausted; no per-unit stepping.
    Simple,
    /// Track the unread set explicitly and step through it; an unchanged
    /// total with zero unread promotes all units to unread to break the
    /// platform's occasional failure to mark state.
    #[default]
    Counting,
}

/// How a single visit to a thread resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The thread was read out (or there was nothing to read).
    Completed,
    /// Terminal not-found page; nothing to read, counts as completed.
    NotFound,
    /// Too many unread units for one visit; the thread was pushed back for
    /// one more visit.
    Deferred,
    /// Content never materialized within the configured rounds.
    Stalled,
}

/// What one visit produced.
#[derive(Debug, Clone)]
pub struct ReadVisit {
    pub outcome: ReadOutcome,
    /// Listing rows seen at the thread foot, for the scheduler to enqueue.
    pub discovered: Vec<ListingRow>,
    pub units_read: usize,
    pub engagements: usize,
}

impl ReadVisit {
    fn new() -> Self {
        Self {
            outcome: ReadOutcome::Completed,
            discovered: Vec::new(),
            units_read: 0,
            engagements: 0,
        }
    }
}

pub struct ReadEngine<'a> {
    source: &'a dyn ContentSource,
    pacer: &'a Pacer,
    reader: &'a ReaderConfig,
    pacing: &'a PacingConfig,
    rng: StdRng,
}

impl<'a> ReadEngine<'a> {
    pub fn new(
        source: &'a dyn ContentSource,
        pacer: &'a Pacer,
        reader: &'a ReaderConfig,
        pacing: &'a PacingConfig,
    ) -> Self {
        Self::with_rng(source, pacer, reader, pacing, StdRng::from_entropy())
    }

    /// Construct with a seeded generator, for deterministic tests.
    pub fn with_rng(
        source: &'a dyn ContentSource,
        pacer: &'a Pacer,
        reader: &'a ReaderConfig,
        pacing: &'a PacingConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            source,
            pacer,
            reader,
            pacing,
            rng,
        }
    }

    /// Drive one visit of `item` to completion. The caller has already
    /// navigated to it. `allow_defer` is false on a revisit of a thread
    /// that was already deferred once; it must then complete.
    pub async fn read(&mut self, item: &Item, allow_defer: bool) -> Result<ReadVisit> {
        let mut visit = ReadVisit::new();
        debug!("Reading {}", item.identifier);

        if !self.await_content(&mut visit).await? {
            return Ok(visit);
        }

        // Scanning prologue: one human-read pause on the first unit, then
        // force end-of-content navigation and harvest whatever listing the
        // platform renders at the foot.
        if self.source.focus_unit(0).await? {
            visit.units_read += 1;
        }
        self.pacer.pause(self.pacing.read_pause()).await?;
        self.source.jump_to_end().await?;
        self.pacer.pause(self.pacing.listing_stall()).await?;

        let rows = self.source.list_items().await?;
        if rows.is_empty() {
            debug!("No listing rows at the thread foot");
        } else {
            info!("Found {} threads at the foot of {}", rows.len(), item.identifier);
            visit.discovered = rows;
        }

        match self.reader.policy {
            ReadPolicy::Simple => {
                debug!("Thread {} treated as exhausted", item.identifier);
            }
            ReadPolicy::Counting => {
                self.scan_counting(allow_defer, &mut visit).await?;
            }
        }

        Ok(visit)
    }

    /// `AwaitingContent`: poll until the content container exists. Returns
    /// false when the visit already resolved (not-found or stalled).
    async fn await_content(&mut self, visit: &mut ReadVisit) -> Result<bool> {
        let mut rounds = 0u32;
        loop {
            if self.source.has_content().await? {
                return Ok(true);
            }
            if self.source.is_terminal_not_found().await? {
                info!("Not-found page, moving on");
                visit.outcome = ReadOutcome::NotFound;
                return Ok(false);
            }

            rounds += 1;
            if self.reader.max_content_wait_rounds > 0
                && rounds >= self.reader.max_content_wait_rounds
            {
                warn!(
                    "Content never appeared after {} rounds, giving up on this thread",
                    rounds
                );
                visit.outcome = ReadOutcome::Stalled;
                return Ok(false);
            }

            debug!(
                "No content yet, retrying in {}ms",
                self.pacing.content_retry_ms
            );
            self.pacer.pause(self.pacing.content_retry()).await?;
        }
    }

    /// `Scanning` under the counting policy: poll the viewer state, decide
    /// between stepping, deferring, and finishing.
    async fn scan_counting(&mut self, allow_defer: bool, visit: &mut ReadVisit) -> Result<()> {
        let mut prev_total: Option<usize> = None;

        loop {
            let state = self.source.viewer_state().await?;
            let grown = prev_total != Some(state.total_units);
            prev_total = Some(state.total_units);

            let unread = if grown {
                self.source.unread_indices().await?
            } else {
                // The platform stopped marking state; force a full re-scan.
                info!(
                    "No new units, treating all {} as unread",
                    state.total_units
                );
                (0..state.total_units).collect()
            };

            if unread.is_empty() {
                if !grown {
                    // Nothing arrived and nothing is left: read out.
                    return Ok(());
                }
                debug!(
                    "No unread units, re-polling in {}ms",
                    self.pacing.content_retry_ms
                );
                self.pacer.pause(self.pacing.content_retry()).await?;
                continue;
            }

            if allow_defer && unread.len() > self.reader.overflow_ceiling {
                info!(
                    "{} unread units exceed the ceiling of {}, deferring thread",
                    unread.len(),
                    self.reader.overflow_ceiling
                );
                self.source.jump_to_end().await?;
                visit.outcome = ReadOutcome::Deferred;
                return Ok(());
            }

            if self.step_through(&unread, visit).await? {
                return Ok(());
            }
            // A unit vanished mid-iteration; re-enter scanning.
        }
    }

    /// `StepThroughUnread`: pace through the unread set in document order.
    /// Returns false if a unit could not be retrieved (race with a
    /// concurrent load), in which case the caller rescans.
    async fn step_through(&mut self, unread: &[usize], visit: &mut ReadVisit) -> Result<bool> {
        for &index in unread {
            self.pacer.pause(self.pacing.read_pause()).await?;

            if !self.source.focus_unit(index).await? {
                debug!("Unit {} vanished, rescanning", index);
                return Ok(false);
            }
            visit.units_read += 1;

            if self.rng.gen::<f64>() < self.reader.engagement_probability {
                debug!("Engaging with unit {}", index);
                self.source.engage_unit(index).await?;
                visit.engagements += 1;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::scripted::{ScriptedSource, ThreadScript, View};
    use tokio_util::sync::CancellationToken;

    fn pacer() -> Pacer {
        Pacer::with_rng(CancellationToken::new(), StdRng::seed_from_u64(1))
    }

    fn reader_config() -> ReaderConfig {
        ReaderConfig::default()
    }

    fn pacing_config() -> PacingConfig {
        PacingConfig::default()
    }

    fn item(id: &str) -> Item {
        Item {
            identifier: id.to_string(),
            label: "a thread".to_string(),
            discovery_order: 0,
        }
    }

    async fn visit_thread(
        source: &ScriptedSource,
        reader: &ReaderConfig,
        allow_defer: bool,
    ) -> ReadVisit {
        let pacing = pacing_config();
        let pacer = pacer();
        let mut engine =
            ReadEngine::with_rng(source, &pacer, reader, &pacing, StdRng::seed_from_u64(42));
        source.navigate_to("/t/thread/1").await.unwrap();
        engine.read(&item("/t/thread/1"), allow_defer).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_completes_with_zero_units() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                not_found: true,
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::NotFound);
        assert_eq!(visit.units_read, 0);
        assert_eq!(visit.engagements, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_state_terminates() {
        // 0 total / 0 unread on consecutive polls must finish, not spin.
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(0, vec![])],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
        assert_eq!(visit.units_read, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_through_unread_units() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(8, vec![3, 4, 5]), View::new(8, vec![])],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
        // 1 from the scanning prologue + 3 unread
        assert_eq!(visit.units_read, 4);
        assert_eq!(source.focused_units(), vec![0, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_growth_promotes_all_units() {
        // Unread never gets marked; the same total across polls forces a
        // full re-scan of every unit.
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(5, vec![])],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
        assert_eq!(visit.units_read, 1 + 5);
        assert_eq!(source.focused_units(), vec![0, 0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_defers_once() {
        let unread: Vec<usize> = (0..40).collect();
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(40, unread.clone()), View::new(40, vec![])],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::Deferred);
        // Prologue only; the unread set was never stepped through.
        assert_eq!(visit.units_read, 1);
        // One end jump in the prologue, one more from the overflow skip.
        assert_eq!(source.end_jumps(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_revisit_must_complete() {
        let unread: Vec<usize> = (0..40).collect();
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(40, unread)],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), false).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
        assert_eq!(visit.units_read, 1 + 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_unit_rescans() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![
                    View::new(6, vec![2, 3]),
                    View::new(8, vec![4, 5]),
                    View::new(8, vec![]),
                ],
                missing_units: vec![3],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
        // Unit 3 vanished; the engine rescanned and finished the new set.
        assert_eq!(source.focused_units(), vec![0, 2, 3, 4, 5]);
        assert_eq!(visit.units_read, 1 + 1 + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_policy_skips_stepping() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(10, (0..10).collect())],
                foot_rows: vec![ListingRow::new("/t/next/2", "next")],
                ..ThreadScript::default()
            },
        );

        let reader = ReaderConfig {
            policy: ReadPolicy::Simple,
            ..reader_config()
        };
        let visit = visit_thread(&source, &reader, true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
        assert_eq!(visit.units_read, 1);
        assert_eq!(visit.discovered.len(), 1);
        assert_eq!(visit.discovered[0].identifier, "/t/next/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_foot_listing_harvested() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(0, vec![])],
                foot_rows: vec![
                    ListingRow::new("/t/next/2", "next"),
                    ListingRow::new("/t/next/3", "another"),
                ],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.discovered.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_wait_stalls_when_capped() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                content_never: true,
                ..ThreadScript::default()
            },
        );

        let reader = ReaderConfig {
            max_content_wait_rounds: 3,
            ..reader_config()
        };
        let visit = visit_thread(&source, &reader, true).await;
        assert_eq!(visit.outcome, ReadOutcome::Stalled);
        assert_eq!(visit.units_read, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_wait_unbounded_retries_forever() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                content_never: true,
                ..ThreadScript::default()
            },
        );

        let reader = ReaderConfig {
            max_content_wait_rounds: 0,
            ..reader_config()
        };
        let pacing = pacing_config();
        let pacer = pacer();
        let mut engine = ReadEngine::with_rng(
            &source,
            &pacer,
            &reader,
            &pacing,
            StdRng::seed_from_u64(42),
        );
        source.navigate_to("/t/thread/1").await.unwrap();

        // Still polling after far more rounds than any cap would allow.
        let thread_item = item("/t/thread/1");
        tokio::select! {
            _ = engine.read(&thread_item, true) => {
                panic!("unbounded content wait should not resolve")
            }
            _ = tokio::time::sleep(PacingConfig::default().content_retry() * 100) => {}
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_appears_after_delay() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                content_delay_polls: 2,
                views: vec![View::new(0, vec![])],
                ..ThreadScript::default()
            },
        );

        let visit = visit_thread(&source, &reader_config(), true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_surfaces() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(5, vec![0, 1, 2])],
                ..ThreadScript::default()
            },
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let pacer = Pacer::with_rng(cancel, StdRng::seed_from_u64(1));
        let reader = reader_config();
        let pacing = pacing_config();
        let mut engine = ReadEngine::with_rng(
            &source,
            &pacer,
            &reader,
            &pacing,
            StdRng::seed_from_u64(42),
        );
        source.navigate_to("/t/thread/1").await.unwrap();

        let result = engine.read(&item("/t/thread/1"), true).await;
        assert!(matches!(
            result,
            Err(crate::app::SkimmerError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engagement_rate_within_tolerance() {
        // 1200 unread units at p = 0.3: the engagement count must land
        // within 3 standard deviations of the mean.
        let n = 1200usize;
        let p = 0.3f64;
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![
                    View::new(n, (0..n).collect()),
                    View::new(n, vec![]),
                ],
                ..ThreadScript::default()
            },
        );

        let reader = ReaderConfig {
            overflow_ceiling: n + 1,
            engagement_probability: p,
            ..reader_config()
        };
        let visit = visit_thread(&source, &reader, true).await;
        assert_eq!(visit.outcome, ReadOutcome::Completed);

        let mean = n as f64 * p;
        let sigma = (n as f64 * p * (1.0 - p)).sqrt();
        let count = visit.engagements as f64;
        assert!(
            (count - mean).abs() <= 3.0 * sigma,
            "engagement count {} outside 3 sigma of {}",
            count,
            mean
        );
        assert_eq!(source.engaged_count(), visit.engagements);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_engagement_at_zero_probability() {
        let source = ScriptedSource::new();
        source.script_thread(
            "/t/thread/1",
            ThreadScript {
                views: vec![View::new(10, (0..10).collect()), View::new(10, vec![])],
                ..ThreadScript::default()
            },
        );

        let reader = ReaderConfig {
            engagement_probability: 0.0,
            ..reader_config()
        };
        let visit = visit_thread(&source, &reader, true).await;
        assert_eq!(visit.engagements, 0);
        assert_eq!(source.engaged_count(), 0);
    }
}
