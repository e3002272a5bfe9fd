//! Downloading stills with the browser's login cookies.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::cookie::Jar;
use reqwest::{Client, Url};

use crate::browser::SessionCookie;
use crate::error::ScrapeError;
use crate::record::MetadataRecord;

static USER_AGENT: &str = "Mozilla/5.0";
static FALLBACK_EXTENSION: &str = ".jpg";
static IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

/// A still written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub path: PathBuf,
    /// `None` when the body could not be decoded as an image.
    pub dimensions: Option<(u32, u32)>,
}

impl DownloadedImage {
    /// Add `image_path` and the dimension columns to `record`.
    pub fn annotate(&self, record: &mut MetadataRecord) {
        record.insert("image_path", self.path.display().to_string());
        if let Some((width, height)) = self.dimensions {
            if let Some(ratios) = AspectRatios::of(width, height) {
                record.insert("image_width", width.to_string());
                record.insert("image_height", height.to_string());
                record.insert("image_aspect_ratio_fraction", ratios.fraction);
                record.insert("image_aspect_ratio_cinema", ratios.cinema);
            }
        }
    }
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Replace the cookies sent with every download.
    async fn adopt_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), ScrapeError>;

    /// Download `url` and store it as `<shot_id><ext>`.
    async fn fetch(&self, url: &str, shot_id: &str) -> Result<DownloadedImage, ScrapeError>;
}

/// [`ImageFetcher`] over `reqwest`.
pub struct HttpImageFetcher {
    client: Client,
    images_dir: PathBuf,
    timeout: Duration,
    /// Where host-less cookies are scoped.
    origin: Url,
}

impl HttpImageFetcher {
    pub fn new(
        images_dir: impl Into<PathBuf>,
        timeout: Duration,
        origin: &str,
    ) -> Result<Self, ScrapeError> {
        let origin = Url::parse(origin)
            .map_err(|e| ScrapeError::Configuration(format!("invalid site url '{origin}': {e}")))?;
        Ok(Self {
            client: build_client(Arc::new(Jar::default()), timeout)?,
            images_dir: images_dir.into(),
            timeout,
            origin,
        })
    }

    fn cookie_url(&self, cookie: &SessionCookie) -> Option<Url> {
        match cookie.domain.as_deref() {
            Some(domain) if !domain.is_empty() => {
                let host = domain.trim_start_matches('.');
                Url::parse(&format!("{}://{host}/", self.origin.scheme())).ok()
            }
            _ => Some(self.origin.clone()),
        }
    }
}

fn build_client(jar: Arc<Jar>, timeout: Duration) -> Result<Client, ScrapeError> {
    Client::builder()
        .cookie_provider(jar)
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ScrapeError::Configuration(format!("could not build HTTP client: {e}")))
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn adopt_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), ScrapeError> {
        let jar = Jar::default();
        for cookie in cookies {
            let Some(url) = self.cookie_url(cookie) else {
                warn!("Skipping cookie '{}' with unusable domain", cookie.name);
                continue;
            };
            let mut header = format!("{}={}", cookie.name, cookie.value);
            if let Some(domain) = cookie.domain.as_deref().filter(|d| !d.is_empty()) {
                header.push_str(&format!("; Domain={domain}"));
            }
            header.push_str(&format!("; Path={}", cookie.path.as_deref().unwrap_or("/")));
            jar.add_cookie_str(&header, &url);
        }
        self.client = build_client(Arc::new(jar), self.timeout)?;
        debug!("HTTP client now carries {} browser cookie(s)", cookies.len());
        Ok(())
    }

    async fn fetch(&self, url: &str, shot_id: &str) -> Result<DownloadedImage, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::download(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::download(url, format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::download(url, e))?;

        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| ScrapeError::download(url, e))?;
        let path = self
            .images_dir
            .join(format!("{shot_id}{}", image_extension(url)));
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| ScrapeError::download(url, e))?;

        let dimensions = match image_dimensions(&body) {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                warn!("Error reading image dimensions for {shot_id}: {e}");
                None
            }
        };

        Ok(DownloadedImage { path, dimensions })
    }
}

fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// File extension for a still, from its URL path.
pub fn image_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();
    let Some(dot) = file_name.rfind('.') else {
        return FALLBACK_EXTENSION;
    };
    let ext = file_name[dot..].to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Aspect ratio columns for a still.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectRatios {
    /// Reduced `w:h`.
    pub fraction: String,
    /// Closest standard film ratio, or `"{ratio:.2}:1"`.
    pub cinema: String,
}

/// Standard ratios and their labels; a match must be within 5 %.
const CINEMA_STANDARDS: [(f64, &str); 7] = [
    (2.39, "2.39:1"),
    (2.35, "2.35:1"),
    (1.85, "1.85:1"),
    (1.78, "16:9"),
    (1.66, "5:3"),
    (1.33, "4:3"),
    (1.00, "1:1"),
];
const CINEMA_TOLERANCE: f64 = 0.05;

impl AspectRatios {
    pub fn of(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let divisor = gcd(width, height);
        let fraction = format!("{}:{}", width / divisor, height / divisor);

        let ratio = f64::from(width) / f64::from(height);
        let (closest, label) = CINEMA_STANDARDS
            .iter()
            .copied()
            .min_by(|(a, _), (b, _)| (a - ratio).abs().total_cmp(&(b - ratio).abs()))?;
        let cinema = if (ratio - closest).abs() / closest < CINEMA_TOLERANCE {
            label.to_string()
        } else {
            format!("{ratio:.2}:1")
        };

        Some(Self { fraction, cinema })
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
