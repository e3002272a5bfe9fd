use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use log::info;

use crate::error::ScrapeError;
use crate::site::DEFAULT_BROWSE_URL;

pub static EMAIL_VAR: &str = "SHOTDECK_EMAIL";
pub static PASSWORD_VAR: &str = "SHOTDECK_PASSWORD";
pub static BROWSE_URL_VAR: &str = "SHOTDECK_BROWSE_URL";
pub static OUTPUT_DIR_VAR: &str = "SHOTDECK_OUTPUT_DIR";

/// Upper bound for `--timeout` and `--scroll-pause`, in seconds.
const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Command line flags.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shotdeck-scrape",
    about = "Scrape Shotdeck stills and metadata into a spreadsheet and an image folder"
)]
pub struct Cli {
    /// How many shots to scrape
    #[arg(long, default_value_t = 100)]
    pub max_shots: usize,

    /// Spreadsheet to write (.xlsx, or .csv for plain text)
    #[arg(long, default_value = "shotdeck_center_composition.xlsx")]
    pub out_xlsx: PathBuf,

    /// Directory for downloaded stills
    #[arg(long, default_value = "shotdeck_images")]
    pub images_dir: PathBuf,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Timeout for page loads and element waits, in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Attempts at loading the gallery before giving up
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Save progress every N shots
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    /// Pause after each gallery scroll, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub scroll_pause: f64,

    /// WebDriver server to drive the browser through
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,
}

/// Login for the target site. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for one run, fixed at startup.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub credentials: Credentials,
    pub browse_url: String,
    pub output_dir: PathBuf,
    pub spreadsheet_path: PathBuf,
    pub images_dir: PathBuf,
    pub max_shots: usize,
    pub batch_size: usize,
    pub timeout: Duration,
    pub retries: u32,
    pub scroll_pause: Duration,
    /// Wait before refreshing a gallery that timed out, and between click attempts.
    pub retry_pause: Duration,
    /// Politeness delay between shots.
    pub item_pause: Duration,
    pub headless: bool,
    pub webdriver_url: String,
}

impl RunConfiguration {
    /// Build from CLI flags and the process environment.
    pub fn from_env(cli: &Cli) -> Result<Self, ScrapeError> {
        Self::from_sources(cli, |key| std::env::var(key).ok())
    }

    /// Build from CLI flags and an arbitrary variable lookup.
    pub fn from_sources<F>(cli: &Cli, lookup: F) -> Result<Self, ScrapeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (email, password) = match (non_empty(EMAIL_VAR), non_empty(PASSWORD_VAR)) {
            (Some(email), Some(password)) => (email, password),
            _ => {
                return Err(ScrapeError::Configuration(format!(
                    "please set {EMAIL_VAR} and {PASSWORD_VAR}"
                )))
            }
        };

        let browse_url = non_empty(BROWSE_URL_VAR).unwrap_or_else(|| {
            info!("{BROWSE_URL_VAR} not set, using default: {DEFAULT_BROWSE_URL}");
            DEFAULT_BROWSE_URL.to_string()
        });

        let output_dir = match non_empty(OUTPUT_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let cwd = std::env::current_dir()?;
                info!(
                    "{OUTPUT_DIR_VAR} not set, using current directory: {}",
                    cwd.display()
                );
                cwd
            }
        };

        if cli.max_shots == 0 {
            return Err(ScrapeError::Configuration(
                "--max-shots must be at least 1".into(),
            ));
        }
        if cli.batch_size == 0 {
            return Err(ScrapeError::Configuration(
                "--batch-size must be at least 1".into(),
            ));
        }
        if cli.retries == 0 {
            return Err(ScrapeError::Configuration(
                "--retries must be at least 1".into(),
            ));
        }
        if cli.timeout == 0 || cli.timeout > MAX_WAIT_SECS {
            return Err(ScrapeError::Configuration(format!(
                "--timeout must be between 1 and {MAX_WAIT_SECS} seconds, got {}",
                cli.timeout
            )));
        }
        if !(0.0..=MAX_WAIT_SECS as f64).contains(&cli.scroll_pause) {
            return Err(ScrapeError::Configuration(format!(
                "--scroll-pause must be between 0 and {MAX_WAIT_SECS} seconds, got {}",
                cli.scroll_pause
            )));
        }

        Ok(Self {
            credentials: Credentials { email, password },
            browse_url,
            spreadsheet_path: under(&output_dir, &cli.out_xlsx),
            images_dir: under(&output_dir, &cli.images_dir),
            output_dir,
            max_shots: cli.max_shots,
            batch_size: cli.batch_size,
            timeout: Duration::from_secs(cli.timeout),
            retries: cli.retries,
            scroll_pause: Duration::from_secs_f64(cli.scroll_pause),
            retry_pause: Duration::from_secs(5),
            item_pause: Duration::from_millis(500),
            headless: cli.headless,
            webdriver_url: cli.webdriver_url.clone(),
        })
    }

    /// Where rows go when the main spreadsheet cannot be written.
    pub fn backup_path(&self) -> PathBuf {
        let ext = self
            .spreadsheet_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("xlsx");
        self.output_dir
            .join(format!("shotdeck_error_backup.{ext}"))
    }
}

fn under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
