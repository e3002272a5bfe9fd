//! Capability interface over a remote-controlled browser.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// How often waits re-check the page.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out after {}s waiting for '{selector}'", timeout.as_secs_f64())]
    Timeout { selector: String, timeout: Duration },
    #[error("no element matches '{0}'")]
    NotFound(String),
    #[error("browser backend error: {0}")]
    Backend(String),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Timeout { .. })
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// When a wait of `timeout` started now gives up. `None` when the timeout is
/// too large to represent, which means waiting without a deadline.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Time left before `deadline`, or `None` once it has passed.
pub fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            (now < deadline).then(|| deadline - now)
        }
        None => Some(Duration::MAX),
    }
}

/// A cookie held by the browser, handed to the HTTP client after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

/// What the pipeline needs from a browser.
///
/// Selectors are CSS. Elements are opaque handles owned by the backend; a
/// handle may go stale once the page changes, in which case calls on it fail
/// with [`BrowserError::Backend`].
#[async_trait]
pub trait BrowserSession: Send + Sync {
    type Element: Clone + Send + Sync;

    async fn navigate(&self, url: &str) -> BrowserResult<()>;
    async fn current_url(&self) -> BrowserResult<String>;
    async fn refresh(&self) -> BrowserResult<()>;

    async fn find_elements(&self, selector: &str) -> BrowserResult<Vec<Self::Element>>;
    async fn find_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> BrowserResult<Vec<Self::Element>>;

    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> BrowserResult<Option<String>>;
    async fn read_text(&self, element: &Self::Element) -> BrowserResult<String>;
    async fn is_displayed(&self, element: &Self::Element) -> BrowserResult<bool>;

    async fn click(&self, element: &Self::Element) -> BrowserResult<()>;
    async fn type_text(&self, element: &Self::Element, text: &str) -> BrowserResult<()>;
    async fn scroll_into_view(&self, element: &Self::Element) -> BrowserResult<()>;
    async fn scroll_to_bottom(&self) -> BrowserResult<()>;
    async fn document_height(&self) -> BrowserResult<u64>;
    async fn press_escape(&self) -> BrowserResult<()>;

    async fn cookies(&self) -> BrowserResult<Vec<SessionCookie>>;
    async fn quit(&self) -> BrowserResult<()>;

    /// First element matching `selector` inside `scope`, if any.
    async fn find_first_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> BrowserResult<Option<Self::Element>> {
        Ok(self.find_within(scope, selector).await?.into_iter().next())
    }

    /// Wait until an element matching `selector` is displayed.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> BrowserResult<Self::Element> {
        let deadline = deadline_after(timeout);
        loop {
            for element in self.find_elements(selector).await? {
                if self.is_displayed(&element).await.unwrap_or(false) {
                    return Ok(element);
                }
            }

            match remaining(deadline) {
                Some(left) => sleep(POLL_INTERVAL.min(left)).await,
                None => {
                    return Err(BrowserError::Timeout {
                        selector: selector.to_string(),
                        timeout,
                    })
                }
            }
        }
    }

    /// Wait until no displayed element matches `selector`.
    async fn wait_until_gone(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let deadline = deadline_after(timeout);
        loop {
            let mut visible = false;
            for element in self.find_elements(selector).await? {
                if self.is_displayed(&element).await.unwrap_or(false) {
                    visible = true;
                    break;
                }
            }
            if !visible {
                return Ok(());
            }

            match remaining(deadline) {
                Some(left) => sleep(POLL_INTERVAL.min(left)).await,
                None => {
                    return Err(BrowserError::Timeout {
                        selector: selector.to_string(),
                        timeout,
                    })
                }
            }
        }
    }
}
