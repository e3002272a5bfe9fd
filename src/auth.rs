use std::time::Duration;

use log::{debug, info};
use tokio::time::sleep;

use crate::browser::{deadline_after, remaining, BrowserSession};
use crate::config::Credentials;
use crate::error::ScrapeError;
use crate::site::{ACCOUNT_MENU, LOGIN_ERROR, LOGIN_PASS, LOGIN_SUBMIT, LOGIN_URL, LOGIN_USER};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Log in through the site's login form.
///
/// Succeeds once the browser leaves the login page or the account menu shows
/// up. An error banner on the login page, or neither indicator within
/// `timeout`, is an [`ScrapeError::Authentication`].
pub async fn login<B: BrowserSession>(
    browser: &B,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), ScrapeError> {
    info!("Logging in as {}", credentials.email);
    browser.navigate(LOGIN_URL).await?;

    let username_field = browser
        .wait_for(LOGIN_USER, timeout)
        .await
        .map_err(|e| ScrapeError::Authentication(format!("login form did not appear: {e}")))?;
    let password_field = first(browser, LOGIN_PASS).await?;
    let login_button = first(browser, LOGIN_SUBMIT).await?;

    browser
        .type_text(&username_field, &credentials.email)
        .await
        .map_err(|e| {
            ScrapeError::Authentication(format!("could not enter the email: {e}"))
        })?;
    browser
        .type_text(&password_field, &credentials.password)
        .await
        .map_err(|e| {
            ScrapeError::Authentication(format!("could not enter the password: {e}"))
        })?;
    browser
        .click(&login_button)
        .await
        .map_err(|e| {
            ScrapeError::Authentication(format!("could not submit the login form: {e}"))
        })?;

    wait_for_logged_in(browser, timeout).await?;
    info!("Login successful");
    Ok(())
}

async fn first<B: BrowserSession>(browser: &B, selector: &str) -> Result<B::Element, ScrapeError> {
    browser
        .find_elements(selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ScrapeError::Authentication(format!("could not find '{selector}'")))
}

async fn wait_for_logged_in<B: BrowserSession>(
    browser: &B,
    timeout: Duration,
) -> Result<(), ScrapeError> {
    let deadline = deadline_after(timeout);
    loop {
        if let Some(message) = login_error(browser).await? {
            return Err(ScrapeError::Authentication(message));
        }

        let url = browser.current_url().await?;
        if !url.starts_with(LOGIN_URL) {
            debug!("Left the login page for {url}");
            return Ok(());
        }
        if !browser.find_elements(ACCOUNT_MENU).await?.is_empty() {
            debug!("Account menu present");
            return Ok(());
        }

        let Some(left) = remaining(deadline) else {
            return Err(ScrapeError::Authentication(format!(
                "still on the login page after {}s",
                timeout.as_secs_f64()
            )));
        };
        sleep(POLL_INTERVAL.min(left)).await;
    }
}

/// Text of a visible error banner, if the site shows one.
async fn login_error<B: BrowserSession>(browser: &B) -> Result<Option<String>, ScrapeError> {
    for element in browser.find_elements(LOGIN_ERROR).await? {
        if !browser.is_displayed(&element).await.unwrap_or(false) {
            continue;
        }
        let text = browser.read_text(&element).await.unwrap_or_default();
        let text = text.trim();
        return Ok(Some(if text.is_empty() {
            "the site rejected the credentials".to_string()
        } else {
            text.to_string()
        }));
    }
    Ok(None)
}
