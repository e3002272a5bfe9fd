//! Reading one shot's detail overlay.

use std::time::Duration;

use log::{debug, warn};
use tokio::time::sleep;

use crate::browser::{BrowserError, BrowserSession};
use crate::error::ScrapeError;
use crate::record::{ItemReference, MetadataRecord};
use crate::site::{
    ANCHOR, DETAIL_GROUP, DETAIL_TYPE, DETAIL_VALUE, FULL_LOCATION, HERO_IMAGE, HERO_LINK,
    MODAL_BODY, MODAL_CLOSE, MODAL_TITLE, PALETTE_SWATCH, TILE_THUMB,
};

const CLICK_ATTEMPTS: u32 = 3;

/// Opens detail overlays and turns them into [`MetadataRecord`]s.
pub struct ItemExtractor<'a, B: BrowserSession> {
    browser: &'a B,
    timeout: Duration,
    retry_pause: Duration,
}

impl<'a, B: BrowserSession> ItemExtractor<'a, B> {
    pub fn new(browser: &'a B, timeout: Duration, retry_pause: Duration) -> Self {
        Self {
            browser,
            timeout,
            retry_pause,
        }
    }

    /// Extract one shot. The overlay is closed again whatever the outcome.
    ///
    /// Metadata fields are best-effort; only a missing image URL fails the shot.
    pub async fn extract(&self, item: &ItemReference) -> Result<MetadataRecord, ScrapeError> {
        let outcome = match self.open_overlay(item).await {
            Ok(()) => self.read_overlay(item).await,
            Err(e) => Err(ScrapeError::extraction(&item.shot_id, e)),
        };
        self.close_overlay().await;
        outcome
    }

    async fn open_overlay(&self, item: &ItemReference) -> Result<(), BrowserError> {
        let tile = self
            .browser
            .find_elements(&item.locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NotFound(item.locator.clone()))?;
        let thumb = self
            .browser
            .find_first_within(&tile, TILE_THUMB)
            .await?
            .ok_or_else(|| BrowserError::NotFound(TILE_THUMB.to_string()))?;

        self.browser.scroll_into_view(&thumb).await?;
        self.click_with_retry(&thumb).await?;
        self.browser.wait_for(MODAL_BODY, self.timeout).await?;
        Ok(())
    }

    async fn click_with_retry(&self, element: &B::Element) -> Result<(), BrowserError> {
        let mut attempt = 1;
        loop {
            match self.browser.click(element).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < CLICK_ATTEMPTS => {
                    warn!("Click issue, attempt {attempt}/{CLICK_ATTEMPTS}: {e}");
                    sleep(self.retry_pause).await;
                    let _ = self.browser.scroll_into_view(element).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_overlay(&self, item: &ItemReference) -> Result<MetadataRecord, ScrapeError> {
        let image_url = self
            .image_url()
            .await
            .ok_or_else(|| ScrapeError::extraction(&item.shot_id, "image url not found"))?;

        let mut record = MetadataRecord::new(&item.shot_id, image_url);
        record.extend(item.summary.clone());

        if let Some(title) = self.first_text(MODAL_TITLE).await {
            record.insert("title_year_raw", title);
        }
        if let Some(palette) = self.palette().await {
            record.insert("palette_hex", palette);
        }
        for (label, value) in self.detail_groups().await {
            record.insert(label, value);
        }
        Ok(record)
    }

    async fn first_text(&self, selector: &str) -> Option<String> {
        let element = self.browser.find_elements(selector).await.ok()?.into_iter().next()?;
        non_empty(collapse_whitespace(&self.browser.read_text(&element).await.ok()?))
    }

    async fn palette(&self) -> Option<String> {
        let swatches = self.browser.find_elements(PALETTE_SWATCH).await.ok()?;
        let mut colours = Vec::new();
        for swatch in &swatches {
            if let Ok(Some(style)) = self.browser.read_attribute(swatch, "style").await {
                if let Some(colour) = background_colour(&style) {
                    colours.push(colour);
                }
            }
        }
        non_empty(colours.join(","))
    }

    async fn detail_groups(&self) -> Vec<(String, String)> {
        let groups = match self.browser.find_elements(DETAIL_GROUP).await {
            Ok(groups) => groups,
            Err(e) => {
                debug!("No detail groups: {e}");
                return Vec::new();
            }
        };

        let mut fields = Vec::new();
        for group in &groups {
            match self.detail_group(group).await {
                Some(field) => fields.push(field),
                None => debug!("Skipping unreadable detail group"),
            }
        }
        fields
    }

    async fn detail_group(&self, group: &B::Element) -> Option<(String, String)> {
        let label_el = self.browser.find_first_within(group, DETAIL_TYPE).await.ok()??;
        let label = normalize_field_name(&self.browser.read_text(&label_el).await.ok()?);
        if label.is_empty() {
            return None;
        }

        let details = self.browser.find_first_within(group, DETAIL_VALUE).await.ok()??;
        Some((label, self.detail_value(&details).await?))
    }

    /// Full location span first, then the linked values, then the plain text.
    async fn detail_value(&self, details: &B::Element) -> Option<String> {
        if let Ok(Some(span)) = self.browser.find_first_within(details, FULL_LOCATION).await {
            if let Some(full) = self
                .browser
                .read_text(&span)
                .await
                .ok()
                .and_then(|t| non_empty(collapse_whitespace(&t)))
            {
                return Some(full);
            }
        }

        let anchors = self
            .browser
            .find_within(details, ANCHOR)
            .await
            .unwrap_or_default();
        if !anchors.is_empty() {
            let mut values = Vec::new();
            for anchor in &anchors {
                if let Ok(text) = self.browser.read_text(anchor).await {
                    let text = collapse_whitespace(&text);
                    if !text.is_empty() {
                        values.push(text);
                    }
                }
            }
            return non_empty(values.join(", "));
        }

        non_empty(collapse_whitespace(
            &self.browser.read_text(details).await.ok()?,
        ))
    }

    async fn image_url(&self) -> Option<String> {
        for (selector, attribute) in [(HERO_LINK, "href"), (HERO_IMAGE, "src")] {
            let Ok(elements) = self.browser.find_elements(selector).await else {
                continue;
            };
            let Some(element) = elements.first() else {
                continue;
            };
            if let Ok(Some(url)) = self.browser.read_attribute(element, attribute).await {
                if let Some(url) = non_empty(url.trim().to_string()) {
                    return Some(url);
                }
            }
            debug!("'{selector}' has no {attribute}, trying fallback");
        }
        None
    }

    async fn close_overlay(&self) {
        let close_button = match self.browser.find_elements(MODAL_CLOSE).await {
            Ok(buttons) => buttons.into_iter().next(),
            Err(_) => None,
        };

        if let Some(button) = close_button {
            if self.browser.click(&button).await.is_ok()
                && self
                    .browser
                    .wait_until_gone(MODAL_BODY, self.timeout)
                    .await
                    .is_ok()
            {
                return;
            }
        }

        debug!("Closing overlay with Escape");
        if let Err(e) = self.browser.press_escape().await {
            warn!("Could not dismiss the detail overlay: {e}");
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Trim and squash every run of whitespace into one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"Lens Size:"` → `"lens_size"`, `"Film / Show Type"` → `"film_show_type"`.
pub fn normalize_field_name(label: &str) -> String {
    let label = label.trim().trim_end_matches(':').to_lowercase();

    let mut name = String::with_capacity(label.len());
    let mut in_separator = false;
    for c in label.chars() {
        if c.is_whitespace() || c == '/' {
            if !in_separator {
                name.push('_');
                in_separator = true;
            }
        } else {
            name.push(if c == '-' { '_' } else { c });
            in_separator = false;
        }
    }
    name
}

/// Colour value of an inline `background-color` declaration.
pub fn background_colour(style: &str) -> Option<String> {
    let start = style.find("background-color:")? + "background-color:".len();
    let rest = &style[start..];
    let value = rest.split(';').next()?.trim();
    non_empty(value.to_string())
}
