use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::browser::BrowserSession;
use crate::error::ScrapeError;
use crate::extract::collapse_whitespace;
use crate::record::ItemReference;
use crate::site::{tile_locator, GALLERY_TILE, TILE_THUMB, TILE_THUMB_IMG, TILE_TITLE};

/// Scroll rounds in a row without a new tile before giving up.
const MAX_ROUNDS_WITHOUT_NEW: u32 = 3;

/// Open the gallery at `url` and wait for its first tile.
///
/// `retries` is the total number of attempts. A page load or tile wait that
/// times out costs one attempt: after `retry_pause` the page is loaded again
/// (re-navigated if the load itself timed out, refreshed otherwise).
pub async fn load_gallery<B: BrowserSession>(
    browser: &B,
    url: &str,
    timeout: Duration,
    retries: u32,
    retry_pause: Duration,
    interrupt: &AtomicBool,
) -> Result<(), ScrapeError> {
    let mut page_loaded = false;
    for attempt in 1..=retries {
        if interrupt.load(Ordering::SeqCst) {
            return Err(ScrapeError::Interrupted);
        }
        if attempt > 1 {
            sleep(retry_pause).await;
        }

        let loaded = if page_loaded {
            browser.refresh().await
        } else {
            info!("Navigating to browse page: {url}");
            browser.navigate(url).await
        };
        match loaded {
            Ok(()) => page_loaded = true,
            Err(e) if e.is_timeout() => {
                warn!("Browse page load timeout, attempt {attempt}/{retries}");
                page_loaded = false;
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        match browser.wait_for(GALLERY_TILE, timeout).await {
            Ok(_) => {
                info!("Gallery loaded successfully");
                return Ok(());
            }
            Err(e) if e.is_timeout() => {
                warn!("Gallery loading timeout, attempt {attempt}/{retries}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ScrapeError::GalleryLoad { attempts: retries })
}

/// Scroll the gallery until `target` shots are known or it stops growing.
///
/// References come back in discovery order, top of the gallery first, without
/// duplicates. Once `interrupt` is set, the references found so far are returned.
pub async fn collect_references<B: BrowserSession>(
    browser: &B,
    target: usize,
    scroll_pause: Duration,
    interrupt: &AtomicBool,
) -> Result<Vec<ItemReference>, ScrapeError> {
    let mut references = Vec::new();
    let mut seen = HashSet::new();
    let mut rounds_without_new = 0;
    let mut last_height = browser.document_height().await?;
    let mut grew = true;

    info!("Collecting up to {target} shots from the gallery...");

    loop {
        let tiles = browser.find_elements(GALLERY_TILE).await?;
        let before = references.len();

        for tile in &tiles {
            if references.len() >= target {
                break;
            }
            let Some(shot_id) = browser
                .read_attribute(tile, "data-shotid")
                .await
                .ok()
                .flatten()
                .filter(|id| !id.is_empty())
            else {
                continue;
            };
            if !seen.insert(shot_id.clone()) {
                continue;
            }

            let summary = read_tile_summary(browser, tile).await;
            references.push(ItemReference {
                locator: tile_locator(&shot_id),
                shot_id,
                summary,
            });
        }

        let found = references.len() - before;
        info!(
            "Visible tiles: {}, collected: {}/{target}",
            tiles.len(),
            references.len()
        );

        if references.len() >= target {
            break;
        }
        if interrupt.load(Ordering::SeqCst) {
            warn!("Interrupted, keeping the {} shots found so far", references.len());
            break;
        }

        if found == 0 {
            rounds_without_new += 1;
            debug!("No new tiles found ({rounds_without_new}/{MAX_ROUNDS_WITHOUT_NEW})");
            if !grew {
                info!("No more content to load");
                break;
            }
            if rounds_without_new >= MAX_ROUNDS_WITHOUT_NEW {
                info!("Gallery stopped producing new shots");
                break;
            }
        } else {
            rounds_without_new = 0;
        }

        debug!("Scrolling to load more content...");
        browser.scroll_to_bottom().await?;
        sleep(scroll_pause).await;

        let height = browser.document_height().await?;
        grew = height > last_height;
        last_height = height;
    }

    Ok(references)
}

/// Grid-level fields for one tile. Missing pieces are left out.
async fn read_tile_summary<B: BrowserSession>(
    browser: &B,
    tile: &B::Element,
) -> BTreeMap<String, String> {
    let mut summary = BTreeMap::new();

    for (attribute, field) in [
        ("data-titleyear", "titleyear"),
        ("data-shot-status", "shot_status"),
        ("data-title-content-status", "title_content_status"),
    ] {
        if let Ok(Some(value)) = browser.read_attribute(tile, attribute).await {
            summary.insert(field.to_string(), value);
        }
    }

    if let Ok(Some(title)) = browser.find_first_within(tile, TILE_TITLE).await {
        if let Ok(text) = browser.read_text(&title).await {
            summary.insert("grid_title_raw".to_string(), collapse_whitespace(&text));
        }
    }

    if let Ok(Some(img)) = browser.find_first_within(tile, TILE_THUMB_IMG).await {
        if let Ok(Some(src)) = browser.read_attribute(&img, "src").await {
            summary.insert("thumb_src".to_string(), src);
        }
    }

    if let Ok(Some(thumb)) = browser.find_first_within(tile, TILE_THUMB).await {
        if let Ok(Some(name)) = browser.read_attribute(&thumb, "data-filename").await {
            summary.insert("data_filename".to_string(), name);
        }
    }

    summary.retain(|_, v| !v.is_empty());
    summary
}
