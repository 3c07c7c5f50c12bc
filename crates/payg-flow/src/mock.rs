//! Simulated storefront.
//!
//! An in-memory model of the retail site's pay-as-you-go journey that
//! implements the browser traits. It backs the test-suite and
//! `payg-flow run --simulate`, and reproduces the behaviours the flow has to
//! cope with:
//!
//! - a cookie-consent banner that covers the page until dismissed, with
//!   consent remembered per context only;
//! - handset cards and plan buttons that render progressively after
//!   navigation;
//! - out-of-stock handsets that lead to a dead end;
//! - a configurable number of handsets and plans, so ordinals can run past
//!   the end;
//! - a collapsed mobile menu whose links are hidden by CSS and so absent
//!   from role queries;
//! - optional query failures right after a navigation, the way a real page
//!   reports a destroyed execution context.
//!
//! Counters in [`StoreStats`] let tests check that sessions and contexts
//! were torn down.

use crate::config::RunConfig;
use crate::driver::{BrowserDriver, ContextOptions, Launcher, LoadState, PageDriver, Screenshot};
use crate::ident::CorrelationId;
use crate::locator::{Locator, Role, Selector};
use crate::result::{FlowError, FlowResult};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

const MODELS: [&str; 6] = [
    "Apple iPhone 15",
    "Samsung Galaxy A15",
    "Motorola moto g24",
    "Nokia G22",
    "Samsung Galaxy A05s",
    "Apple iPhone 13",
];

const SCREEN_WIDTH: u32 = 160;
const SCREEN_HEIGHT: u32 = 90;

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    browsers_closed: AtomicUsize,
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    clicks: AtomicUsize,
}

/// Snapshot of the storefront's lifecycle counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Browsers launched
    pub launches: usize,
    /// Browsers closed
    pub browsers_closed: usize,
    /// Contexts created
    pub contexts_opened: usize,
    /// Contexts disposed
    pub contexts_closed: usize,
    /// Clicks performed
    pub clicks: usize,
}

impl StoreStats {
    /// Browsers launched and not yet closed
    #[must_use]
    pub const fn live_browsers(&self) -> usize {
        self.launches.saturating_sub(self.browsers_closed)
    }

    /// Contexts created and not yet disposed
    #[must_use]
    pub const fn open_contexts(&self) -> usize {
        self.contexts_opened.saturating_sub(self.contexts_closed)
    }
}

/// Shape and behaviour of the simulated site
#[derive(Debug, Clone)]
pub struct Storefront {
    handsets: usize,
    plans: usize,
    out_of_stock: BTreeSet<usize>,
    broken_checkout: bool,
    offline: bool,
    launch_fails: bool,
    render_delay: Duration,
    latency: Duration,
    navigation_glitches: usize,
    counters: Arc<Counters>,
}

impl Default for Storefront {
    fn default() -> Self {
        Self {
            handsets: 8,
            plans: 3,
            out_of_stock: BTreeSet::new(),
            broken_checkout: false,
            offline: false,
            launch_fails: false,
            render_delay: Duration::from_millis(20),
            latency: Duration::ZERO,
            navigation_glitches: 0,
            counters: Arc::new(Counters::default()),
        }
    }
}

impl Storefront {
    /// Eight handsets, three plans, everything in stock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handset cards on the listing page
    #[must_use]
    pub const fn with_handsets(mut self, count: usize) -> Self {
        self.handsets = count;
        self
    }

    /// Number of "Get this plan" buttons
    #[must_use]
    pub const fn with_plans(mut self, count: usize) -> Self {
        self.plans = count;
        self
    }

    /// Mark a handset as out of stock
    #[must_use]
    pub fn with_out_of_stock(mut self, handset_index: usize) -> Self {
        self.out_of_stock.insert(handset_index);
        self
    }

    /// "Go to checkout" lands on an error page
    #[must_use]
    pub const fn with_broken_checkout(mut self) -> Self {
        self.broken_checkout = true;
        self
    }

    /// Navigation fails
    #[must_use]
    pub const fn with_offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Launching the browser fails
    #[must_use]
    pub const fn with_launch_failure(mut self) -> Self {
        self.launch_fails = true;
        self
    }

    /// Time until listing pages are fully rendered (half appear at the midpoint)
    #[must_use]
    pub const fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Delay added to every driver call
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The first `queries` count/visibility queries after every navigation
    /// fail with a driver error
    #[must_use]
    pub const fn with_navigation_glitch(mut self, queries: usize) -> Self {
        self.navigation_glitches = queries;
        self
    }

    /// Handset count
    #[must_use]
    pub const fn handsets(&self) -> usize {
        self.handsets
    }

    /// Plan count
    #[must_use]
    pub const fn plans(&self) -> usize {
        self.plans
    }

    /// Launcher sharing this storefront's counters
    #[must_use]
    pub fn launcher(&self) -> SimulatedLauncher {
        SimulatedLauncher {
            store: self.clone(),
        }
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            launches: c.launches.load(Ordering::SeqCst),
            browsers_closed: c.browsers_closed.load(Ordering::SeqCst),
            contexts_opened: c.contexts_opened.load(Ordering::SeqCst),
            contexts_closed: c.contexts_closed.load(Ordering::SeqCst),
            clicks: c.clicks.load(Ordering::SeqCst),
        }
    }

    /// Display name of a handset card
    #[must_use]
    pub fn handset_label(index: usize) -> String {
        let price = 99 + 50 * index;
        format!("Phone from €{price} {}", MODELS[index % MODELS.len()])
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// Pages of the simulated journey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePage {
    /// Nothing loaded yet
    Blank,
    /// Home page, consent banner until dismissed
    Home,
    /// Pay-as-you-go handset listing
    PaygPhones,
    /// Dead end for an unavailable handset
    OutOfStock {
        /// Selected handset
        handset: usize,
    },
    /// "Are you an existing customer?"
    CustomerPrompt {
        /// Selected handset
        handset: usize,
    },
    /// New or existing number
    NumberChoice {
        /// Selected handset
        handset: usize,
    },
    /// Plan listing
    Plans {
        /// Selected handset
        handset: usize,
    },
    /// Basket summary
    Basket {
        /// Selected handset
        handset: usize,
        /// Selected plan
        plan: usize,
    },
    /// Order review
    Review,
    /// Interstitial before checkout
    CheckoutGate,
    /// Checkout with its step list
    Checkout,
    /// Checkout failed to load
    CheckoutError,
}

impl StorePage {
    const fn shade(self) -> [u8; 3] {
        match self {
            Self::Blank => [255, 255, 255],
            Self::Home => [230, 0, 0],
            Self::PaygPhones => [200, 40, 40],
            Self::OutOfStock { .. } | Self::CheckoutError => [60, 60, 60],
            Self::CustomerPrompt { .. } => [40, 120, 200],
            Self::NumberChoice { .. } => [40, 160, 200],
            Self::Plans { .. } => [40, 200, 120],
            Self::Basket { .. } => [200, 160, 40],
            Self::Review => [160, 80, 200],
            Self::CheckoutGate => [120, 120, 220],
            Self::Checkout => [20, 180, 60],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Go(StorePage),
    DismissConsent,
}

#[derive(Debug, Clone)]
struct Element {
    role: Option<Role>,
    tag: &'static str,
    name: String,
    visible: bool,
    accessible: bool,
    transition: Option<Transition>,
}

impl Element {
    fn button(name: impl Into<String>, transition: Transition) -> Self {
        Self {
            role: Some(Role::Button),
            tag: "button",
            name: name.into(),
            visible: true,
            accessible: true,
            transition: Some(transition),
        }
    }

    fn link(name: impl Into<String>, transition: Transition) -> Self {
        Self {
            role: Some(Role::Link),
            tag: "a",
            name: name.into(),
            visible: true,
            accessible: true,
            transition: Some(transition),
        }
    }

    fn paragraph(text: impl Into<String>) -> Self {
        Self {
            role: None,
            tag: "p",
            name: text.into(),
            visible: true,
            accessible: true,
            transition: None,
        }
    }

    fn list_item(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::ListItem),
            tag: "li",
            name: text.into(),
            visible: true,
            accessible: true,
            transition: None,
        }
    }

    const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// `display: none`; out of the accessibility tree
    const fn collapsed(mut self) -> Self {
        self.visible = false;
        self.accessible = false;
        self
    }

    fn matches(&self, locator: &Locator) -> bool {
        if !self.accessible && matches!(locator.selector(), Selector::Role { .. }) {
            return false;
        }
        locator.matches(self.role, self.tag, &self.name, &self.name)
    }
}

/// Launches [`SimulatedBrowser`]s over a shared [`Storefront`]
#[derive(Debug, Clone)]
pub struct SimulatedLauncher {
    store: Storefront,
}

#[async_trait]
impl Launcher for SimulatedLauncher {
    async fn launch(&self, config: &RunConfig) -> FlowResult<Arc<dyn BrowserDriver>> {
        self.store.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.store.launch_fails {
            return Err(FlowError::BrowserLaunch {
                message: "simulated launch failure".to_string(),
            });
        }
        tracing::debug!(
            headless = config.headless,
            slow_motion_ms = config.slow_motion_ms,
            "simulated browser launched"
        );
        Ok(Arc::new(SimulatedBrowser {
            store: self.store.clone(),
            closed: AtomicBool::new(false),
            pages: Mutex::new(Vec::new()),
        }))
    }
}

/// A simulated browser session
#[derive(Debug)]
pub struct SimulatedBrowser {
    store: Storefront,
    closed: AtomicBool,
    /// Closed flags of every page opened on this browser
    pages: Mutex<Vec<Arc<AtomicBool>>>,
}

impl SimulatedBrowser {
    fn pages(&self) -> std::sync::MutexGuard<'_, Vec<Arc<AtomicBool>>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mark a page closed, counting it once
fn close_page(store: &Storefront, closed: &AtomicBool) {
    if !closed.swap(true, Ordering::SeqCst) {
        store.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserDriver for SimulatedBrowser {
    fn backend(&self) -> &'static str {
        "simulated"
    }

    async fn new_context(&self, options: ContextOptions) -> FlowResult<Box<dyn PageDriver>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FlowError::Context {
                message: "browser has been closed".to_string(),
            });
        }
        self.store.pause().await;
        self.store
            .counters
            .contexts_opened
            .fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        self.pages().push(Arc::clone(&closed));
        Ok(Box::new(SimulatedPage::new(
            self.store.clone(),
            options.id,
            closed,
        )))
    }

    async fn close(&self) -> FlowResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Contexts die with their browser
            for page in self.pages().drain(..) {
                close_page(&self.store, &page);
            }
            self.store
                .counters
                .browsers_closed
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// One page in its own simulated context
#[derive(Debug)]
pub struct SimulatedPage {
    store: Storefront,
    id: CorrelationId,
    page: StorePage,
    consent_dismissed: bool,
    rendered_at: Instant,
    glitches_left: usize,
    closed: Arc<AtomicBool>,
}

impl SimulatedPage {
    fn new(store: Storefront, id: CorrelationId, closed: Arc<AtomicBool>) -> Self {
        Self {
            store,
            id,
            page: StorePage::Blank,
            consent_dismissed: false,
            rendered_at: Instant::now(),
            glitches_left: 0,
            closed,
        }
    }

    /// Page currently shown
    #[must_use]
    pub const fn current(&self) -> StorePage {
        self.page
    }

    fn ensure_open(&self) -> FlowResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FlowError::driver(format!("page in context {} has been closed", self.id)));
        }
        Ok(())
    }

    fn glitch(&mut self) -> FlowResult<()> {
        if self.glitches_left > 0 {
            self.glitches_left -= 1;
            return Err(FlowError::driver(
                "Execution context was destroyed, most likely because of a navigation",
            ));
        }
        Ok(())
    }

    fn navigate(&mut self, page: StorePage) {
        self.page = page;
        self.rendered_at = Instant::now();
        self.glitches_left = self.store.navigation_glitches;
    }

    /// How many of `total` progressively rendered items exist right now
    fn rendered(&self, total: usize) -> usize {
        let delay = self.store.render_delay;
        let elapsed = self.rendered_at.elapsed();
        if elapsed >= delay {
            total
        } else if elapsed >= delay / 2 {
            total.div_ceil(2)
        } else {
            0
        }
    }

    fn elements(&self) -> Vec<Element> {
        use Transition::{DismissConsent, Go};
        match self.page {
            StorePage::Blank => Vec::new(),
            StorePage::Home => {
                let mut els = Vec::new();
                if !self.consent_dismissed {
                    els.push(Element::paragraph("We use cookies to improve your experience"));
                    els.push(Element::button("Accept All Cookies", DismissConsent));
                    els.push(Element::button("Reject All", DismissConsent));
                }
                let covered = !self.consent_dismissed;
                let mut payg = Element::link("Pay as you go phones Prepay", Go(StorePage::PaygPhones));
                let mut bill = Element::link("Bill pay phones", Go(StorePage::Home));
                if covered {
                    payg = payg.hidden();
                    bill = bill.hidden();
                }
                els.push(payg);
                els.push(bill);
                els.push(
                    Element::link("Pay as you go phones Prepay", Go(StorePage::PaygPhones))
                        .collapsed(),
                );
                els
            }
            StorePage::PaygPhones => {
                let mut els = vec![Element::paragraph("Pay as you go phones")];
                els.extend((0..self.rendered(self.store.handsets)).map(|i| {
                    let next = if self.store.out_of_stock.contains(&i) {
                        StorePage::OutOfStock { handset: i }
                    } else {
                        StorePage::CustomerPrompt { handset: i }
                    };
                    Element::button(Storefront::handset_label(i), Go(next))
                }));
                els
            }
            StorePage::OutOfStock { .. } => vec![
                Element::paragraph("Sorry, this phone is out of stock"),
                Element::link("Back to phones", Go(StorePage::PaygPhones)),
            ],
            StorePage::CustomerPrompt { handset } => vec![
                Element::paragraph("Are you an existing customer?"),
                Element::link("Yes", Go(StorePage::NumberChoice { handset })),
                Element::link("No", Go(StorePage::NumberChoice { handset })),
            ],
            StorePage::NumberChoice { handset } => vec![
                Element::link("Get a new number", Go(StorePage::Plans { handset })),
                Element::link("Keep my existing number", Go(StorePage::Plans { handset })),
            ],
            StorePage::Plans { handset } => {
                let mut els = vec![Element::paragraph("Choose your plan")];
                els.extend((0..self.rendered(self.store.plans)).map(|plan| {
                    Element::button("Get this plan", Go(StorePage::Basket { handset, plan }))
                }));
                els
            }
            StorePage::Basket { .. } => vec![
                Element::paragraph("Your basket"),
                Element::button("Continue to basket", Go(StorePage::Review)),
            ],
            StorePage::Review => vec![
                Element::button("Continue shopping", Go(StorePage::PaygPhones)),
                Element::button("Continue", Go(StorePage::CheckoutGate)),
            ],
            StorePage::CheckoutGate => {
                let next = if self.store.broken_checkout {
                    StorePage::CheckoutError
                } else {
                    StorePage::Checkout
                };
                vec![Element::button("Go to checkout", Go(next))]
            }
            StorePage::Checkout => vec![
                Element::list_item("Basket"),
                Element::list_item("Secure Checkout"),
                Element::list_item("Confirmation"),
            ],
            StorePage::CheckoutError => vec![Element::paragraph("Something went wrong")],
        }
    }

    fn matching(&self, locator: &Locator) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|e| e.matches(locator))
            .collect()
    }

    fn render_png(&self) -> FlowResult<Vec<u8>> {
        let [r, g, b] = self.page.shade();
        let mut img = RgbaImage::from_pixel(SCREEN_WIDTH, SCREEN_HEIGHT, Rgba([r, g, b, 255]));
        if matches!(self.page, StorePage::Home) && !self.consent_dismissed {
            for y in SCREEN_HEIGHT * 2 / 3..SCREEN_HEIGHT {
                for x in 0..SCREEN_WIDTH {
                    img.put_pixel(x, y, Rgba([20, 20, 20, 255]));
                }
            }
        }
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| FlowError::driver(format!("screenshot encoding failed: {e}")))?;
        Ok(png)
    }
}

#[async_trait]
impl PageDriver for SimulatedPage {
    async fn goto(&mut self, url: &str, _state: LoadState) -> FlowResult<()> {
        self.ensure_open()?;
        self.store.pause().await;
        if self.store.offline {
            return Err(FlowError::Navigation {
                url: url.to_string(),
                message: "net::ERR_INTERNET_DISCONNECTED".to_string(),
            });
        }
        self.navigate(StorePage::Home);
        Ok(())
    }

    async fn count(&mut self, locator: &Locator) -> FlowResult<usize> {
        self.ensure_open()?;
        self.store.pause().await;
        self.glitch()?;
        Ok(self.matching(locator).len())
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> FlowResult<bool> {
        self.ensure_open()?;
        self.store.pause().await;
        let Some(element) = self.matching(locator).into_iter().nth(index) else {
            return Ok(false);
        };
        self.store.counters.clicks.fetch_add(1, Ordering::SeqCst);
        match element.transition {
            Some(Transition::Go(page)) => self.navigate(page),
            Some(Transition::DismissConsent) => self.consent_dismissed = true,
            None => {}
        }
        Ok(true)
    }

    async fn is_visible(&mut self, locator: &Locator, index: usize) -> FlowResult<bool> {
        self.ensure_open()?;
        self.store.pause().await;
        self.glitch()?;
        Ok(self
            .matching(locator)
            .get(index)
            .is_some_and(|e| e.visible))
    }

    async fn screenshot(&mut self) -> FlowResult<Screenshot> {
        self.ensure_open()?;
        let png = self.render_png()?;
        Ok(Screenshot::new(png, SCREEN_WIDTH, SCREEN_HEIGHT))
    }

    async fn close(&mut self) -> FlowResult<()> {
        close_page(&self.store, &self.closed);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::TextMatch;

    fn options(id: &str) -> ContextOptions {
        ContextOptions::from_config(CorrelationId::new(id), &RunConfig::default())
    }

    async fn open_page(store: &Storefront) -> (Arc<dyn BrowserDriver>, Box<dyn PageDriver>) {
        let browser = store.launcher().launch(&RunConfig::default()).await.unwrap();
        let page = browser.new_context(options("c1")).await.unwrap();
        (browser, page)
    }

    fn reject() -> Locator {
        Locator::role(Role::Button, TextMatch::contains("Reject"))
    }

    fn payg() -> Locator {
        Locator::role(Role::Link, TextMatch::contains("Pay as you go phones Prepay"))
    }

    fn handsets() -> Locator {
        Locator::role(Role::Button, TextMatch::contains("Phone from €"))
    }

    #[tokio::test]
    async fn test_consent_banner_covers_home() {
        let store = Storefront::new();
        let (_b, mut page) = open_page(&store).await;
        page.goto("https://example.test", LoadState::DomContentLoaded)
            .await
            .unwrap();
        assert_eq!(page.count(&reject()).await.unwrap(), 1);
        assert!(!page.is_visible(&payg(), 0).await.unwrap());
        assert!(page.click(&reject(), 0).await.unwrap());
        assert_eq!(page.count(&reject()).await.unwrap(), 0);
        assert!(page.is_visible(&payg(), 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_handsets_render_progressively() {
        let store = Storefront::new()
            .with_handsets(6)
            .with_render_delay(Duration::from_millis(200));
        let (_b, mut page) = open_page(&store).await;
        page.goto("/", LoadState::Load).await.unwrap();
        page.click(&reject(), 0).await.unwrap();
        page.click(&payg(), 0).await.unwrap();
        assert_eq!(page.count(&handsets()).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(page.count(&handsets()).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_click_past_end_reports_missing() {
        let store = Storefront::new().with_handsets(2).with_render_delay(Duration::ZERO);
        let (_b, mut page) = open_page(&store).await;
        page.goto("/", LoadState::Load).await.unwrap();
        page.click(&reject(), 0).await.unwrap();
        page.click(&payg(), 0).await.unwrap();
        assert!(!page.click(&handsets(), 2).await.unwrap());
        assert!(page.click(&handsets(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_out_of_stock_dead_end() {
        let store = Storefront::new()
            .with_out_of_stock(1)
            .with_render_delay(Duration::ZERO);
        let browser = store.launcher().launch(&RunConfig::default()).await.unwrap();
        let mut raw = SimulatedPage::new(
            store.clone(),
            CorrelationId::new("x"),
            Arc::new(AtomicBool::new(false)),
        );
        raw.consent_dismissed = true;
        raw.goto("/", LoadState::Load).await.unwrap();
        raw.click(&payg(), 0).await.unwrap();
        raw.click(&handsets(), 1).await.unwrap();
        assert_eq!(raw.current(), StorePage::OutOfStock { handset: 1 });
        let no = Locator::role(Role::Link, TextMatch::exact("No"));
        assert_eq!(raw.count(&no).await.unwrap(), 0);
        browser.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_contexts_do_not_share_consent() {
        let store = Storefront::new();
        let browser = store.launcher().launch(&RunConfig::default()).await.unwrap();
        let mut a = browser.new_context(options("a")).await.unwrap();
        let mut b = browser.new_context(options("b")).await.unwrap();
        a.goto("/", LoadState::Load).await.unwrap();
        a.click(&reject(), 0).await.unwrap();
        b.goto("/", LoadState::Load).await.unwrap();
        assert_eq!(a.count(&reject()).await.unwrap(), 0);
        assert_eq!(b.count(&reject()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_navigation_fails() {
        let store = Storefront::new().with_offline();
        let (_b, mut page) = open_page(&store).await;
        let err = page.goto("https://www.vodafone.ie", LoadState::Load).await.unwrap_err();
        assert!(matches!(err, FlowError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_counters() {
        let store = Storefront::new();
        let (browser, mut page) = open_page(&store).await;
        assert_eq!(store.stats().open_contexts(), 1);
        page.close().await.unwrap();
        page.close().await.unwrap();
        assert_eq!(store.stats().open_contexts(), 0);
        assert!(page.count(&reject()).await.is_err());
        browser.close().await.unwrap();
        assert_eq!(store.stats().live_browsers(), 0);
        assert!(browser.new_context(options("late")).await.is_err());
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let store = Storefront::new().with_launch_failure();
        let err = store.launcher().launch(&RunConfig::default()).await.unwrap_err();
        assert!(matches!(err, FlowError::BrowserLaunch { .. }));
        assert_eq!(store.stats().launches, 1);
    }

    #[tokio::test]
    async fn test_screenshot_is_png() {
        let store = Storefront::new();
        let (_b, mut page) = open_page(&store).await;
        let shot = page.screenshot().await.unwrap();
        assert!(shot.is_valid());
        assert_eq!(&shot.data[1..4], b"PNG");
    }

    #[tokio::test]
    async fn test_browser_close_closes_its_pages() {
        let store = Storefront::new();
        let (browser, mut page) = open_page(&store).await;
        page.goto("/", LoadState::Load).await.unwrap();
        browser.close().await.unwrap();
        assert_eq!(store.stats().open_contexts(), 0);
        assert!(page.goto("/", LoadState::Load).await.is_err());
        page.close().await.unwrap();
        assert_eq!(store.stats().contexts_closed, 1);
    }

    #[tokio::test]
    async fn test_collapsed_menu_link_is_not_a_role_match() {
        let store = Storefront::new();
        let (_b, mut page) = open_page(&store).await;
        page.goto("/", LoadState::Load).await.unwrap();
        page.click(&reject(), 0).await.unwrap();
        assert_eq!(page.count(&payg()).await.unwrap(), 1);
        let by_text = Locator::text("a", TextMatch::contains("Pay as you go phones Prepay"));
        assert_eq!(page.count(&by_text).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_navigation_glitch_fails_first_queries() {
        let store = Storefront::new().with_navigation_glitch(2);
        let (_b, mut page) = open_page(&store).await;
        page.goto("/", LoadState::Load).await.unwrap();
        assert!(matches!(
            page.count(&reject()).await,
            Err(FlowError::Driver { .. })
        ));
        assert!(page.is_visible(&reject(), 0).await.is_err());
        assert_eq!(page.count(&reject()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latency_slows_every_call() {
        let store = Storefront::new().with_latency(Duration::from_millis(30));
        let (_b, mut page) = open_page(&store).await;
        let started = std::time::Instant::now();
        page.goto("/", LoadState::Load).await.unwrap();
        page.count(&reject()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_handset_labels_match_locator() {
        for i in 0..10 {
            assert!(handsets().matches(Some(Role::Button), "button", &Storefront::handset_label(i), ""));
        }
    }
}
