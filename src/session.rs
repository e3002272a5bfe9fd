use log::{debug, info};

use crate::browser::BrowserSession;
use crate::config::RunConfiguration;
use crate::error::ScrapeError;
use crate::fetch::{HttpImageFetcher, ImageFetcher};
use crate::site::BASE_URL;
use crate::webdriver::WebDriverSession;

/// The browser plus the HTTP client that shares its login.
///
/// Owned by the run; call [`SessionContext::close`] once the run is over,
/// whether it succeeded or not.
pub struct SessionContext<B, F> {
    browser: B,
    fetcher: F,
}

impl SessionContext<WebDriverSession, HttpImageFetcher> {
    pub async fn launch(config: &RunConfiguration) -> Result<Self, ScrapeError> {
        let fetcher = HttpImageFetcher::new(&config.images_dir, config.timeout, BASE_URL)?;
        let browser =
            WebDriverSession::launch(&config.webdriver_url, config.headless, config.timeout)
                .await?;
        Ok(Self::new(browser, fetcher))
    }
}

impl<B: BrowserSession, F: ImageFetcher> SessionContext<B, F> {
    pub fn new(browser: B, fetcher: F) -> Self {
        Self { browser, fetcher }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Copy the browser's cookies into the HTTP client.
    pub async fn share_cookies(&mut self) -> Result<usize, ScrapeError> {
        let cookies = self.browser.cookies().await?;
        self.fetcher.adopt_cookies(&cookies).await?;
        debug!("Shared {} cookie(s) with the image fetcher", cookies.len());
        Ok(cookies.len())
    }

    /// Quit the browser.
    pub async fn close(self) -> Result<(), ScrapeError> {
        info!("Closing browser session");
        self.browser.quit().await?;
        Ok(())
    }
}
