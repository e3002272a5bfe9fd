//! Scrape Shotdeck stills and their metadata into a spreadsheet plus an image folder.
//!
//! The run is a single sequential loop: log in, collect gallery references,
//! then extract, download and record one shot at a time. Browser access goes
//! through the [`browser::BrowserSession`] capability trait so the pipeline does
//! not depend on a particular automation backend.

pub mod auth;
pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod gallery;
pub mod pipeline;
pub mod record;
pub mod session;
pub mod site;
pub mod store;
pub mod webdriver;

pub use browser::{BrowserError, BrowserSession, SessionCookie};
pub use config::{Cli, Credentials, RunConfiguration};
pub use error::ScrapeError;
pub use fetch::{DownloadedImage, HttpImageFetcher, ImageFetcher};
pub use pipeline::{Pipeline, RunState, RunSummary};
pub use record::{ItemReference, MetadataRecord};
pub use session::SessionContext;
pub use store::ProgressStore;
pub use webdriver::WebDriverSession;
