//! Everything that depends on Shotdeck's markup.
//!
//! The scraper relies on this shape staying stable; selectors are kept here so
//! a layout change touches one file.

pub static BASE_URL: &str = "https://shotdeck.com";
pub static LOGIN_URL: &str = "https://shotdeck.com/welcome/login";
pub static DEFAULT_BROWSE_URL: &str = "https://shotdeck.com/browse/stills";

// Login form
pub static LOGIN_USER: &str = "input[name='user']";
pub static LOGIN_PASS: &str = "input[name='pass']";
pub static LOGIN_SUBMIT: &str = "form button[type=submit]";
pub static LOGIN_ERROR: &str = ".alert-danger, .login-error";
pub static ACCOUNT_MENU: &str = "#account-menu, .account-menu";

// Gallery grid
pub static GALLERY_TILE: &str = "#stills .outerimage";
pub static TILE_THUMB: &str = "a.gallerythumb";
pub static TILE_THUMB_IMG: &str = "a.gallerythumb img.still";
pub static TILE_TITLE: &str = ".moviedetails.topdetails .gallerytitle";

// Detail overlay
pub static MODAL_BODY: &str = "#shot-details-body";
pub static MODAL_TITLE: &str = "#shotModalTitle";
pub static MODAL_CLOSE: &str = ".modal-header button.close";
pub static PALETTE_SWATCH: &str = ".palette a[style*='background-color']";
pub static DETAIL_GROUP: &str = "#shot_details .detail-group";
pub static DETAIL_TYPE: &str = ".detail-type";
pub static DETAIL_VALUE: &str = ".details";
pub static FULL_LOCATION: &str = "span.full_location, span.full_filming_location";
pub static ANCHOR: &str = "a";
pub static HERO_LINK: &str = "#hero a";
pub static HERO_IMAGE: &str = "#shot_details_hero";

/// Selector that finds one gallery tile again by its shot id.
pub fn tile_locator(shot_id: &str) -> String {
    format!(
        "{GALLERY_TILE}[data-shotid=\"{}\"]",
        escape_css_string(shot_id)
    )
}

/// Inverse of [`tile_locator`].
pub fn shot_id_from_locator(locator: &str) -> Option<String> {
    let quoted = locator
        .strip_prefix(GALLERY_TILE)?
        .strip_prefix("[data-shotid=\"")?
        .strip_suffix("\"]")?;
    Some(unescape_css_string(quoted))
}

/// Escape `value` for use inside a double-quoted CSS string.
fn escape_css_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_control() => escaped.push_str(&format!("\\{:x} ", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut hex = String::new();
        while let Some(d) = chars.peek().filter(|d| d.is_ascii_hexdigit() && hex.len() < 6) {
            hex.push(*d);
            chars.next();
        }
        if hex.is_empty() {
            out.extend(chars.next());
        } else {
            if chars.peek() == Some(&' ') {
                chars.next();
            }
            out.extend(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32));
        }
    }
    out
}
