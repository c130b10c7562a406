//! The traversal scheduler: the top-level cooperative loop.
//!
//! Discovers the initial backlog, then dequeues one thread at a time,
//! navigates to it, runs the read engine to completion, merges anything the
//! engine discovered, and paces to the next iteration with a randomized
//! delay. Cancellation turns into a clean stop with a partial summary.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::app::{Result, SkimmerError};
use crate::config::Config;
use crate::pacing::Pacer;
use crate::reader::backlog::Backlog;
use crate::reader::engine::{ReadEngine, ReadOutcome};
use crate::reader::poller::DiscoveryPoller;
use crate::source::{ContentSource, ListingRow};

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Distinct threads ever enqueued.
    pub discovered: usize,
    /// Threads read out normally.
    pub completed: usize,
    /// Threads that resolved to a not-found page.
    pub not_found: usize,
    /// Overflow deferrals (each thread at most once).
    pub deferred: usize,
    /// Threads abandoned after a navigation or read failure.
    pub failed: usize,
    /// Threads whose content never materialized.
    pub stalled: usize,
    pub units_read: usize,
    pub engagements: usize,
    /// The run was cancelled before the backlog emptied.
    pub cancelled: bool,
}

pub struct Scheduler<'a> {
    source: &'a dyn ContentSource,
    pacer: &'a Pacer,
    config: &'a Config,
    backlog: Backlog,
    deferred_once: HashSet<String>,
    summary: RunSummary,
}

impl<'a> Scheduler<'a> {
    pub fn new(source: &'a dyn ContentSource, pacer: &'a Pacer, config: &'a Config) -> Self {
        Self {
            source,
            pacer,
            config,
            backlog: Backlog::new(),
            deferred_once: HashSet::new(),
            summary: RunSummary::default(),
        }
    }

    /// Discover the backlog and read through it until empty. Cancellation
    /// stops the loop cleanly and marks the summary.
    pub async fn run(&mut self) -> Result<RunSummary> {
        match self.traverse().await {
            Ok(()) => {}
            Err(SkimmerError::Cancelled) => {
                info!(
                    "Run cancelled with {} threads still pending",
                    self.backlog.len()
                );
                self.summary.cancelled = true;
            }
            Err(e) => return Err(e),
        }
        Ok(std::mem::take(&mut self.summary))
    }

    async fn traverse(&mut self) -> Result<()> {
        let discovery = DiscoveryPoller::new(
            self.source,
            self.pacer,
            &self.config.reader,
            &self.config.pacing,
        )
        .run()
        .await?;
        if discovery.stalled {
            warn!("Discovery stalled; proceeding with what was found");
        }
        self.merge_discovered(discovery.rows);

        let mut engine = ReadEngine::new(
            self.source,
            self.pacer,
            &self.config.reader,
            &self.config.pacing,
        );

        while let Some(item) = self.backlog.dequeue() {
            self.pacer.ensure_active()?;
            info!(
                "Reading thread ({} pending): {} {}",
                self.backlog.len(),
                item.identifier,
                item.label
            );

            match self.source.navigate_to(&item.identifier).await {
                Ok(()) => {}
                Err(SkimmerError::Cancelled) => return Err(SkimmerError::Cancelled),
                Err(e) => {
                    warn!("Failed to open {}: {}", item.identifier, e);
                    self.summary.failed += 1;
                    self.pacer.pause(self.config.pacing.failure_backoff()).await?;
                    continue;
                }
            }
            self.pacer
                .pause(self.config.pacing.post_navigation_pause())
                .await?;

            let allow_defer = !self.deferred_once.contains(&item.identifier);
            match engine.read(&item, allow_defer).await {
                Ok(visit) => {
                    self.summary.units_read += visit.units_read;
                    self.summary.engagements += visit.engagements;
                    self.merge_discovered(visit.discovered);

                    match visit.outcome {
                        ReadOutcome::Completed => self.summary.completed += 1,
                        ReadOutcome::NotFound => self.summary.not_found += 1,
                        ReadOutcome::Stalled => self.summary.stalled += 1,
                        ReadOutcome::Deferred => {
                            self.summary.deferred += 1;
                            self.deferred_once.insert(item.identifier.clone());
                            self.backlog.reinsert(item);
                        }
                    }
                }
                Err(SkimmerError::Cancelled) => return Err(SkimmerError::Cancelled),
                Err(e) => {
                    warn!("Reading {} failed: {}", item.identifier, e);
                    self.summary.failed += 1;
                    self.pacer.pause(self.config.pacing.failure_backoff()).await?;
                    continue;
                }
            }

            self.pacer
                .pause_between(
                    self.config.pacing.idle_delay_min(),
                    self.config.pacing.idle_delay_max(),
                )
                .await?;
        }

        info!("Backlog exhausted");
        Ok(())
    }

    fn merge_discovered(&mut self, rows: Vec<ListingRow>) {
        for row in rows {
            if self.backlog.enqueue(row.identifier, row.label) {
                self.summary.discovered += 1;
            }
        }
    }
}
