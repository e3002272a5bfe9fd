//! In-memory stand-ins for the browser and the image fetcher.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shotdeck_scraper::browser::BrowserResult;
use shotdeck_scraper::config::{BROWSE_URL_VAR, EMAIL_VAR, OUTPUT_DIR_VAR, PASSWORD_VAR};
use shotdeck_scraper::site::{self, shot_id_from_locator};
use shotdeck_scraper::{
    BrowserError, BrowserSession, Cli, DownloadedImage, ImageFetcher, RunConfiguration,
    ScrapeError, SessionCookie,
};

pub const EMAIL: &str = "me@example.com";
pub const PASSWORD: &str = "hunter2";
pub const BROWSE_URL: &str = "https://shotdeck.com/browse/stills";

/// How a detail group presents its value.
#[derive(Debug, Clone)]
pub enum GroupValue {
    Text(String),
    Links(Vec<String>),
    FullLocation(String),
}

#[derive(Debug, Clone)]
pub struct FakeShot {
    pub id: String,
    pub title: String,
    pub hero_href: Option<String>,
    pub hero_src: Option<String>,
    pub swatches: Vec<String>,
    pub groups: Vec<(String, GroupValue)>,
}

impl FakeShot {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: format!("Film {id} (2001)"),
            hero_href: Some(format!("https://cdn.shotdeck.com/stills/{id}.jpg")),
            hero_src: None,
            swatches: vec!["#112233".into(), "#aabbcc".into()],
            groups: vec![
                ("Lens Size:".into(), GroupValue::Text("Wide".into())),
                (
                    "Genre:".into(),
                    GroupValue::Links(vec!["Drama".into(), "Sci-Fi".into()]),
                ),
            ],
        }
    }

    pub fn without_image(mut self) -> Self {
        self.hero_href = None;
        self.hero_src = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    LoginUser,
    LoginPass,
    LoginSubmit,
    LoginError,
    AccountMenu,
    Tile(usize),
    Thumb(usize),
    ThumbImg(usize),
    TileTitle(usize),
    ModalBody,
    ModalTitle,
    ModalClose,
    Swatch(usize),
    Group(usize),
    GroupLabel(usize),
    GroupDetails(usize),
    GroupSpan(usize),
    GroupLink(usize, usize),
    HeroLink,
    HeroImage,
}

#[derive(Debug, Default)]
struct State {
    url: String,
    typed_user: String,
    typed_pass: String,
    logged_in: bool,
    login_rejected: bool,
    visible: usize,
    gallery_timeouts: u32,
    refreshes: u32,
    open: Option<usize>,
    opened: Vec<String>,
    escapes: u32,
    failing_clicks: u32,
    slow_browse_loads: u32,
    scrolls: u32,
}

pub struct FakeBrowser {
    shots: Vec<FakeShot>,
    page_size: usize,
    /// Stay on the login URL after a successful login.
    stay_on_login: bool,
    /// Submitting the login form does nothing at all.
    ignore_login: bool,
    /// Typing into any field fails.
    reject_typing: bool,
    /// The overlay has no close button and only Escape dismisses it.
    no_close_button: bool,
    /// Scrolling grows the page without revealing tiles.
    stalled_scrolling: bool,
    state: Mutex<State>,
    quit: Arc<AtomicBool>,
}

impl FakeBrowser {
    pub fn new(shots: Vec<FakeShot>) -> Self {
        Self {
            shots,
            page_size: 2,
            stay_on_login: false,
            ignore_login: false,
            reject_typing: false,
            no_close_button: false,
            stalled_scrolling: false,
            state: Mutex::new(State::default()),
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// The first `n` gallery waits see no tiles until the page is refreshed.
    pub fn with_gallery_timeouts(self, n: u32) -> Self {
        self.state.lock().unwrap().gallery_timeouts = n;
        self
    }

    /// The next `n` thumbnail clicks fail.
    pub fn with_failing_clicks(self, n: u32) -> Self {
        self.state.lock().unwrap().failing_clicks = n;
        self
    }

    /// The first `n` loads of the browse page time out.
    pub fn with_slow_browse_loads(self, n: u32) -> Self {
        self.state.lock().unwrap().slow_browse_loads = n;
        self
    }

    pub fn staying_on_login(mut self) -> Self {
        self.stay_on_login = true;
        self
    }

    pub fn ignoring_login(mut self) -> Self {
        self.ignore_login = true;
        self
    }

    pub fn rejecting_typing(mut self) -> Self {
        self.reject_typing = true;
        self
    }

    pub fn without_close_button(mut self) -> Self {
        self.no_close_button = true;
        self
    }

    pub fn with_stalled_scrolling(mut self) -> Self {
        self.stalled_scrolling = true;
        self
    }

    pub fn scrolls(&self) -> u32 {
        self.state.lock().unwrap().scrolls
    }

    pub fn refreshes(&self) -> u32 {
        self.state.lock().unwrap().refreshes
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn overlay_open(&self) -> bool {
        self.state.lock().unwrap().open.is_some()
    }

    pub fn escapes(&self) -> u32 {
        self.state.lock().unwrap().escapes
    }

    /// Stays readable after the session that owns the browser is closed.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        self.quit.clone()
    }

    fn on_gallery(state: &State) -> bool {
        state.url == BROWSE_URL && state.logged_in && state.gallery_timeouts == 0
    }

    fn shot(&self, state: &State) -> Option<&FakeShot> {
        state.open.map(|i| &self.shots[i])
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    type Element = Node;

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        if url == BROWSE_URL && state.slow_browse_loads > 0 {
            state.slow_browse_loads -= 1;
            return Err(BrowserError::Timeout {
                selector: "page load".into(),
                timeout: Duration::from_secs(1),
            });
        }
        state.url = url.to_string();
        if url == BROWSE_URL {
            state.visible = self.page_size.min(self.shots.len());
        }
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn refresh(&self) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.refreshes += 1;
        state.gallery_timeouts = state.gallery_timeouts.saturating_sub(1);
        Ok(())
    }

    async fn find_elements(&self, selector: &str) -> BrowserResult<Vec<Node>> {
        let state = self.state.lock().unwrap();
        let on_login = state.url == site::LOGIN_URL;
        let found = if selector == site::LOGIN_USER && on_login {
            vec![Node::LoginUser]
        } else if selector == site::LOGIN_PASS && on_login {
            vec![Node::LoginPass]
        } else if selector == site::LOGIN_SUBMIT && on_login {
            vec![Node::LoginSubmit]
        } else if selector == site::LOGIN_ERROR && state.login_rejected {
            vec![Node::LoginError]
        } else if selector == site::ACCOUNT_MENU && state.logged_in {
            vec![Node::AccountMenu]
        } else if selector == site::GALLERY_TILE && Self::on_gallery(&state) {
            (0..state.visible).map(Node::Tile).collect()
        } else if let Some(id) = shot_id_from_locator(selector) {
            self.shots[..state.visible]
                .iter()
                .position(|s| s.id == id)
                .filter(|_| Self::on_gallery(&state))
                .map(Node::Tile)
                .into_iter()
                .collect()
        } else if let Some(shot) = self.shot(&state) {
            if selector == site::MODAL_BODY {
                vec![Node::ModalBody]
            } else if selector == site::MODAL_TITLE {
                vec![Node::ModalTitle]
            } else if selector == site::MODAL_CLOSE && !self.no_close_button {
                vec![Node::ModalClose]
            } else if selector == site::PALETTE_SWATCH {
                (0..shot.swatches.len()).map(Node::Swatch).collect()
            } else if selector == site::DETAIL_GROUP {
                (0..shot.groups.len()).map(Node::Group).collect()
            } else if selector == site::HERO_LINK && shot.hero_href.is_some() {
                vec![Node::HeroLink]
            } else if selector == site::HERO_IMAGE && shot.hero_src.is_some() {
                vec![Node::HeroImage]
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };
        Ok(found)
    }

    async fn find_within(&self, scope: &Node, selector: &str) -> BrowserResult<Vec<Node>> {
        let state = self.state.lock().unwrap();
        let found = match scope {
            Node::Tile(i) if selector == site::TILE_THUMB => vec![Node::Thumb(*i)],
            Node::Tile(i) if selector == site::TILE_THUMB_IMG => vec![Node::ThumbImg(*i)],
            Node::Tile(i) if selector == site::TILE_TITLE => vec![Node::TileTitle(*i)],
            Node::Group(j) if selector == site::DETAIL_TYPE => vec![Node::GroupLabel(*j)],
            Node::Group(j) if selector == site::DETAIL_VALUE => vec![Node::GroupDetails(*j)],
            Node::GroupDetails(j) => match self.shot(&state).map(|s| &s.groups[*j].1) {
                Some(GroupValue::FullLocation(_)) if selector == site::FULL_LOCATION => {
                    vec![Node::GroupSpan(*j)]
                }
                Some(GroupValue::Links(links)) if selector == site::ANCHOR => {
                    (0..links.len()).map(|k| Node::GroupLink(*j, k)).collect()
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn read_attribute(&self, element: &Node, name: &str) -> BrowserResult<Option<String>> {
        let state = self.state.lock().unwrap();
        let value = match (element, name) {
            (Node::Tile(i), "data-shotid") => Some(self.shots[*i].id.clone()),
            (Node::Tile(i), "data-titleyear") => Some(self.shots[*i].title.clone()),
            (Node::Tile(_), "data-shot-status") => Some("published".to_string()),
            (Node::Thumb(i), "data-filename") => Some(format!("{}.jpg", self.shots[*i].id)),
            (Node::ThumbImg(i), "src") => {
                Some(format!("https://cdn.shotdeck.com/thumb/{}.jpg", self.shots[*i].id))
            }
            (Node::Swatch(k), "style") => self
                .shot(&state)
                .map(|s| format!("background-color: {};", s.swatches[*k])),
            (Node::HeroLink, "href") => self.shot(&state).and_then(|s| s.hero_href.clone()),
            (Node::HeroImage, "src") => self.shot(&state).and_then(|s| s.hero_src.clone()),
            _ => None,
        };
        Ok(value)
    }

    async fn read_text(&self, element: &Node) -> BrowserResult<String> {
        let state = self.state.lock().unwrap();
        let shot = self.shot(&state);
        let text = match element {
            Node::LoginError => "Invalid email or password".to_string(),
            Node::TileTitle(i) => format!("  {} \n", self.shots[*i].title),
            Node::ModalTitle => shot.map(|s| format!("\n {} \n", s.title)).unwrap_or_default(),
            Node::GroupLabel(j) => shot.map(|s| s.groups[*j].0.clone()).unwrap_or_default(),
            Node::GroupDetails(j) => match shot.map(|s| &s.groups[*j].1) {
                Some(GroupValue::Text(t)) => format!("  {t}\n"),
                Some(GroupValue::Links(links)) => links.join("\n"),
                Some(GroupValue::FullLocation(l)) => format!("Short {l}"),
                None => String::new(),
            },
            Node::GroupSpan(j) => match shot.map(|s| &s.groups[*j].1) {
                Some(GroupValue::FullLocation(l)) => l.clone(),
                _ => String::new(),
            },
            Node::GroupLink(j, k) => match shot.map(|s| &s.groups[*j].1) {
                Some(GroupValue::Links(links)) => links[*k].clone(),
                _ => String::new(),
            },
            _ => String::new(),
        };
        Ok(text)
    }

    async fn is_displayed(&self, _element: &Node) -> BrowserResult<bool> {
        Ok(true)
    }

    async fn click(&self, element: &Node) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        match element {
            Node::LoginSubmit if self.ignore_login => {}
            Node::LoginSubmit => {
                if state.typed_user == EMAIL && state.typed_pass == PASSWORD {
                    state.logged_in = true;
                    if !self.stay_on_login {
                        state.url = format!("{}/", site::BASE_URL);
                    }
                } else {
                    state.login_rejected = true;
                }
            }
            Node::Thumb(i) => {
                if state.failing_clicks > 0 {
                    state.failing_clicks -= 1;
                    return Err(BrowserError::Backend("element click intercepted".into()));
                }
                state.open = Some(*i);
                let id = self.shots[*i].id.clone();
                state.opened.push(id);
            }
            Node::ModalClose => state.open = None,
            _ => {}
        }
        Ok(())
    }

    async fn type_text(&self, element: &Node, text: &str) -> BrowserResult<()> {
        if self.reject_typing {
            return Err(BrowserError::Backend("element not interactable".into()));
        }
        let mut state = self.state.lock().unwrap();
        match element {
            Node::LoginUser => state.typed_user = text.to_string(),
            Node::LoginPass => state.typed_pass = text.to_string(),
            _ => {}
        }
        Ok(())
    }

    async fn scroll_into_view(&self, _element: &Node) -> BrowserResult<()> {
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.scrolls += 1;
        if !self.stalled_scrolling {
            state.visible = (state.visible + self.page_size).min(self.shots.len());
        }
        Ok(())
    }

    async fn document_height(&self) -> BrowserResult<u64> {
        let state = self.state.lock().unwrap();
        let grown = if self.stalled_scrolling { state.scrolls } else { 0 };
        Ok(state.visible as u64 * 100 + u64::from(grown) * 10)
    }

    async fn press_escape(&self) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.escapes += 1;
        state.open = None;
        Ok(())
    }

    async fn cookies(&self) -> BrowserResult<Vec<SessionCookie>> {
        let state = self.state.lock().unwrap();
        if !state.logged_in {
            return Ok(Vec::new());
        }
        Ok(vec![SessionCookie {
            name: "sessionid".into(),
            value: "abc".into(),
            domain: Some(".shotdeck.com".into()),
            path: Some("/".into()),
        }])
    }

    async fn quit(&self) -> BrowserResult<()> {
        self.quit.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Pretends every download works except for the listed shots.
#[derive(Default)]
pub struct FakeFetcher {
    pub failing: HashSet<String>,
    pub cookies: Vec<SessionCookie>,
    pub fetched: Mutex<Vec<String>>,
    /// Raise the flag once this many downloads have been attempted.
    interrupt_after: Option<(usize, Arc<AtomicBool>)>,
}

impl FakeFetcher {
    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn interrupting_after(downloads: usize, flag: Arc<AtomicBool>) -> Self {
        Self {
            interrupt_after: Some((downloads, flag)),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn adopt_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), ScrapeError> {
        self.cookies = cookies.to_vec();
        Ok(())
    }

    async fn fetch(&self, url: &str, shot_id: &str) -> Result<DownloadedImage, ScrapeError> {
        let attempts = {
            let mut fetched = self.fetched.lock().unwrap();
            fetched.push(shot_id.to_string());
            fetched.len()
        };
        if let Some((after, flag)) = &self.interrupt_after {
            if attempts >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.failing.contains(shot_id) {
            return Err(ScrapeError::Download {
                url: url.to_string(),
                reason: "HTTP 403 Forbidden".into(),
            });
        }
        Ok(DownloadedImage {
            path: PathBuf::from(format!("/images/{shot_id}.jpg")),
            dimensions: Some((1920, 1080)),
        })
    }
}

pub fn shots(n: usize) -> Vec<FakeShot> {
    (1..=n).map(|i| FakeShot::new(&format!("S{i}"))).collect()
}

/// Configuration with fast timeouts writing CSV under `output_dir`.
pub fn config(output_dir: &std::path::Path, args: &[&str]) -> RunConfiguration {
    let mut argv = vec!["shotdeck-scrape", "--out-xlsx", "shots.csv", "--scroll-pause", "0"];
    argv.extend_from_slice(args);
    let cli = <Cli as clap::Parser>::try_parse_from(argv).unwrap();

    let output = output_dir.display().to_string();
    let mut config = RunConfiguration::from_sources(&cli, |key| match key {
        k if k == EMAIL_VAR => Some(EMAIL.to_string()),
        k if k == PASSWORD_VAR => Some(PASSWORD.to_string()),
        k if k == BROWSE_URL_VAR => Some(BROWSE_URL.to_string()),
        k if k == OUTPUT_DIR_VAR => Some(output.clone()),
        _ => None,
    })
    .unwrap();
    config.timeout = Duration::from_millis(50);
    config.retry_pause = Duration::ZERO;
    config.item_pause = Duration::ZERO;
    config
}

pub fn read_csv(path: &std::path::Path) -> (Vec<String>, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader.records().map(|r| r.unwrap()).collect();
    (headers, rows)
}
