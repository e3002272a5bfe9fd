//! The run: log in, collect references, then extract, download and record
//! each shot in turn.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::time::sleep;

use crate::auth;
use crate::browser::BrowserSession;
use crate::config::RunConfiguration;
use crate::error::ScrapeError;
use crate::extract::ItemExtractor;
use crate::fetch::ImageFetcher;
use crate::gallery;
use crate::session::SessionContext;
use crate::store::ProgressStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Authenticated,
    Paginating,
    Extracting,
    Downloading,
    Recording,
    Flushed,
    Done,
    Failed,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    /// Recorded with a downloaded image.
    pub succeeded: usize,
    /// Recorded, but the image download failed.
    pub metadata_only: usize,
    /// Not recorded because extraction failed.
    pub skipped: usize,
    pub rows_written: usize,
    pub interrupted: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {}, succeeded {}, metadata only {}, skipped {}, rows written {}",
            self.attempted, self.succeeded, self.metadata_only, self.skipped, self.rows_written
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

pub struct Pipeline<'a, B, F> {
    config: &'a RunConfiguration,
    session: &'a mut SessionContext<B, F>,
    store: &'a mut ProgressStore,
    state: RunState,
}

impl<'a, B: BrowserSession, F: ImageFetcher> Pipeline<'a, B, F> {
    pub fn new(
        config: &'a RunConfiguration,
        session: &'a mut SessionContext<B, F>,
        store: &'a mut ProgressStore,
    ) -> Self {
        Self {
            config,
            session,
            store,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug!("Run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run to completion. `interrupt` is checked after login, between gallery
    /// attempts and scroll rounds, and between shots; once set, the run stops
    /// and whatever was collected is flushed.
    pub async fn run(&mut self, interrupt: &AtomicBool) -> Result<RunSummary, ScrapeError> {
        match self.run_inner(interrupt).await {
            Ok(summary) => Ok(summary),
            Err(ScrapeError::Interrupted) => {
                warn!("Interrupted before any shot was processed");
                self.store.finish()?;
                self.advance(RunState::Flushed);
                self.advance(RunState::Done);
                Ok(RunSummary {
                    rows_written: self.store.persisted_rows(),
                    interrupted: true,
                    ..RunSummary::default()
                })
            }
            Err(e) => {
                self.advance(RunState::Failed);
                error!("Run failed: {e}");
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self, interrupt: &AtomicBool) -> Result<RunSummary, ScrapeError> {
        let config = self.config;

        auth::login(self.session.browser(), &config.credentials, config.timeout).await?;
        self.session.share_cookies().await?;
        self.advance(RunState::Authenticated);

        self.advance(RunState::Paginating);
        gallery::load_gallery(
            self.session.browser(),
            &config.browse_url,
            config.timeout,
            config.retries,
            config.retry_pause,
            interrupt,
        )
        .await?;
        let references = gallery::collect_references(
            self.session.browser(),
            config.max_shots,
            config.scroll_pause,
            interrupt,
        )
        .await?;
        info!("Found {} shots to process", references.len());

        let mut summary = RunSummary::default();
        let extractor =
            ItemExtractor::new(self.session.browser(), config.timeout, config.retry_pause);
        let total = references.len();

        for (index, item) in references.iter().enumerate() {
            if interrupt.load(Ordering::SeqCst) {
                warn!("Interrupted, stopping after {} shots", summary.attempted);
                summary.interrupted = true;
                break;
            }
            if index > 0 {
                sleep(config.item_pause).await;
            }

            summary.attempted += 1;
            info!("Processing shot {}/{total} (ID: {})", index + 1, item.shot_id);

            self.state = RunState::Extracting;
            let mut record = match extractor.extract(item).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping shot {}: {e}", item.shot_id);
                    summary.skipped += 1;
                    continue;
                }
            };

            self.state = RunState::Downloading;
            let downloaded = self
                .session
                .fetcher()
                .fetch(record.image_url(), &item.shot_id)
                .await;
            match downloaded {
                Ok(image) => {
                    image.annotate(&mut record);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    warn!("Keeping metadata for shot {} without image: {e}", item.shot_id);
                    summary.metadata_only += 1;
                }
            }

            self.state = RunState::Recording;
            self.store.append(record)?;
        }

        self.store.finish()?;
        self.advance(RunState::Flushed);
        summary.rows_written = self.store.persisted_rows();
        info!(
            "Final results: saved {} rows to {}",
            summary.rows_written,
            self.store.path().display()
        );

        self.advance(RunState::Done);
        Ok(summary)
    }
}
