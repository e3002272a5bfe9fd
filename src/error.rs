use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::browser::BrowserError;

/// Everything that can go wrong during a scrape run.
///
/// `Authentication`, `GalleryLoad` and `Configuration` end the run. Extraction
/// and download failures are scoped to one shot and only get logged.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("login failed: {0}")]
    Authentication(String),
    #[error("gallery did not load after {attempts} attempt(s)")]
    GalleryLoad { attempts: u32 },
    #[error("interrupted before any shot was collected")]
    Interrupted,
    #[error("could not extract shot '{shot_id}': {reason}")]
    Extraction { shot_id: String, reason: String },
    #[error("could not download '{url}': {reason}")]
    Download { url: String, reason: String },
    #[error("could not write spreadsheet {}: {reason}", path.display())]
    Spreadsheet { path: PathBuf, reason: String },
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ScrapeError {
    /// Whether this error should abort the whole run rather than a single shot.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ScrapeError::Extraction { .. } | ScrapeError::Download { .. }
        )
    }

    pub(crate) fn extraction(shot_id: &str, reason: impl ToString) -> Self {
        ScrapeError::Extraction {
            shot_id: shot_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn download(url: &str, reason: impl ToString) -> Self {
        ScrapeError::Download {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
