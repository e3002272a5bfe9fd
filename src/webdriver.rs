//! [`BrowserSession`] backed by a WebDriver server (chromedriver) via `thirtyfour`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use thirtyfour::error::{WebDriverError, WebDriverErrorInner};
use thirtyfour::{prelude::*, By, Key, WebDriver, WebElement};

use crate::browser::{BrowserError, BrowserResult, BrowserSession, SessionCookie};

impl From<WebDriverError> for BrowserError {
    fn from(err: WebDriverError) -> Self {
        BrowserError::Backend(err.to_string())
    }
}

/// Name reported in [`BrowserError::Timeout`] when a page load takes too long.
const PAGE_LOAD: &str = "page load";

pub struct WebDriverSession {
    driver: WebDriver,
    page_load_timeout: Duration,
}

impl WebDriverSession {
    /// Start a Chrome session on the WebDriver server at `webdriver_url`.
    ///
    /// Page loads that take longer than `page_load_timeout` fail with
    /// [`BrowserError::Timeout`].
    pub async fn launch(
        webdriver_url: &str,
        headless: bool,
        page_load_timeout: Duration,
    ) -> BrowserResult<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if headless {
            info!("Running in headless mode");
            caps.set_headless()?;
        } else {
            info!("Running in normal (visible) mode. Pass --headless to hide the browser.");
        }
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;

        let driver = WebDriver::new(webdriver_url, caps).await?;
        debug!("WebDriver session started at {webdriver_url}");
        if let Err(e) = driver.set_page_load_timeout(page_load_timeout).await {
            driver.quit().await.ok();
            return Err(e.into());
        }
        Ok(Self {
            driver,
            page_load_timeout,
        })
    }

    /// Page-load timeouts become [`BrowserError::Timeout`] so callers can retry them.
    fn page_load_error(&self, err: WebDriverError) -> BrowserError {
        match err.as_inner() {
            WebDriverErrorInner::Timeout(_) | WebDriverErrorInner::WebDriverTimeout(_) => {
                BrowserError::Timeout {
                    selector: PAGE_LOAD.to_string(),
                    timeout: self.page_load_timeout,
                }
            }
            _ => err.into(),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    type Element = WebElement;

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| self.page_load_error(e))
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn refresh(&self) -> BrowserResult<()> {
        self.driver
            .refresh()
            .await
            .map_err(|e| self.page_load_error(e))
    }

    async fn find_elements(&self, selector: &str) -> BrowserResult<Vec<WebElement>> {
        Ok(self.driver.find_all(By::Css(selector)).await?)
    }

    async fn find_within(
        &self,
        scope: &WebElement,
        selector: &str,
    ) -> BrowserResult<Vec<WebElement>> {
        Ok(scope.find_all(By::Css(selector)).await?)
    }

    async fn read_attribute(
        &self,
        element: &WebElement,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        Ok(element.attr(name).await?)
    }

    async fn read_text(&self, element: &WebElement) -> BrowserResult<String> {
        Ok(element.text().await?)
    }

    async fn is_displayed(&self, element: &WebElement) -> BrowserResult<bool> {
        Ok(element.is_displayed().await?)
    }

    async fn click(&self, element: &WebElement) -> BrowserResult<()> {
        element.click().await?;
        Ok(())
    }

    async fn type_text(&self, element: &WebElement, text: &str) -> BrowserResult<()> {
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &WebElement) -> BrowserResult<()> {
        element.scroll_into_view().await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> BrowserResult<()> {
        self.driver
            .execute("window.scrollTo(0, document.body.scrollHeight);", Vec::new())
            .await?;
        Ok(())
    }

    async fn document_height(&self) -> BrowserResult<u64> {
        let ret = self
            .driver
            .execute("return document.body.scrollHeight;", Vec::new())
            .await?;
        Ok(ret.json().as_u64().unwrap_or(0))
    }

    async fn press_escape(&self) -> BrowserResult<()> {
        self.driver
            .action_chain()
            .send_keys(Key::Escape)
            .perform()
            .await?;
        Ok(())
    }

    async fn cookies(&self) -> BrowserResult<Vec<SessionCookie>> {
        let cookies = self.driver.get_all_cookies().await?;
        Ok(cookies
            .iter()
            .map(|c| SessionCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
            })
            .collect())
    }

    async fn quit(&self) -> BrowserResult<()> {
        self.driver.clone().quit().await?;
        Ok(())
    }
}
