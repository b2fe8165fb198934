//! Browser pool and scrape flow
//!
//! A fixed set of long-lived browsers serves many concurrent scrapes. Each
//! request takes the next connected browser in round-robin order, opens a
//! fresh tab, and closes it afterwards; no session state leaks between
//! requests. Disconnected browsers are skipped and restarted in the
//! background, and browsers are recycled after a configurable number of
//! requests.

use crate::config::ScraperConfig;
use crate::headers::{get_error_message, is_ad_domain, merge_headers, validate_scrape_url};
use crate::models::{ScrapeRequest, ScrapeResponse};
use crate::ScraperError;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Network::ErrorReason;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Selectors likely to trigger AJAX loads when clicked
const CLICKABLE_SELECTORS: &str = "[data-toggle='tab'], [role='tab'], .nav-tabs a, .tab-link, \
     [data-year], [data-filter], a[href='#'], a[href^='#'], a[href^='javascript:'], \
     button:not([type='submit']), .clickable, [onclick]";

/// Static-asset suffixes never worth collecting as AJAX endpoints
const ASSET_SUFFIXES: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".gif", ".svg", ".woff", ".woff2", ".ico",
];

/// Round-robin slot bookkeeping, independent of the browser type so the
/// selection and recycling rules stay unit-testable
pub(crate) struct RoundRobin<T> {
    slots: Vec<Option<T>>,
    request_counts: Vec<u64>,
    cursor: usize,
    restarting: HashSet<usize>,
}

impl<T: Clone> RoundRobin<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            request_counts: vec![0; capacity],
            cursor: 0,
            restarting: HashSet::new(),
        }
    }

    pub(crate) fn set(&mut self, index: usize, value: T) {
        self.slots[index] = Some(value);
        self.request_counts[index] = 0;
    }

    /// Next live slot in round-robin order
    ///
    /// Returns the selection plus the indices of occupied slots that failed
    /// the liveness probe, so the caller can schedule their restarts.
    pub(crate) fn select(
        &mut self,
        mut alive: impl FnMut(&T) -> bool,
    ) -> (Option<(usize, T)>, Vec<usize>) {
        let mut dead = Vec::new();
        for _ in 0..self.slots.len() {
            let index = self.cursor;
            self.cursor = (self.cursor + 1) % self.slots.len();
            match &self.slots[index] {
                Some(value) if alive(value) => return (Some((index, value.clone())), dead),
                Some(_) => dead.push(index),
                None => {}
            }
        }
        (None, dead)
    }

    /// Count one request against a slot; returns the new count
    pub(crate) fn record_request(&mut self, index: usize) -> u64 {
        match self.request_counts.get_mut(index) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => 0,
        }
    }

    /// Whether a slot has reached the recycle threshold (≤ 0 disables)
    pub(crate) fn should_recycle(&self, index: usize, threshold: i64) -> bool {
        if threshold <= 0 {
            return false;
        }
        self.request_counts
            .get(index)
            .is_some_and(|count| *count >= threshold as u64)
    }

    /// Mark a restart in flight; false when one is already running
    pub(crate) fn begin_restart(&mut self, index: usize) -> bool {
        self.restarting.insert(index)
    }

    /// Complete a restart: a replacement resets the counter, failure leaves
    /// the slot and counter untouched so selection moves to a live peer
    pub(crate) fn finish_restart(&mut self, index: usize, replacement: Option<T>) {
        if let Some(value) = replacement {
            self.set(index, value);
        }
        self.restarting.remove(&index);
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn request_count(&self, index: usize) -> u64 {
        self.request_counts[index]
    }
}

/// Pool of long-lived browsers serving concurrent scrapes
pub struct BrowserPool {
    config: ScraperConfig,
    state: Mutex<RoundRobin<Arc<Browser>>>,
    semaphore: Arc<Semaphore>,
    active_pages: AtomicUsize,
    started: AtomicBool,
}

impl BrowserPool {
    /// Create a pool; call [`start`](Self::start) before scraping
    pub fn new(config: ScraperConfig) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_pages));
        Arc::new(Self {
            state: Mutex::new(RoundRobin::new(config.browser_count)),
            semaphore,
            active_pages: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            config,
        })
    }

    /// Pages currently in flight
    pub fn active_pages(&self) -> usize {
        self.active_pages.load(Ordering::SeqCst)
    }

    /// Pool-wide page limit
    pub fn max_concurrent_pages(&self) -> usize {
        self.config.max_concurrent_pages
    }

    /// Launch the browsers; a partial pool is better than none
    pub async fn start(&self) -> Result<(), ScraperError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("browser pool already running");
            return Ok(());
        }

        info!(
            browser_count = self.config.browser_count,
            headless = self.config.headless,
            max_concurrent_pages = self.config.max_concurrent_pages,
            "starting browser pool"
        );

        for index in 0..self.config.browser_count {
            let config = self.config.clone();
            let launched = tokio::task::spawn_blocking(move || launch_browser(&config)).await;
            match launched {
                Ok(Ok(browser)) => {
                    self.state.lock().expect("pool lock").set(index, Arc::new(browser));
                    info!(browser_index = index, "browser started");
                }
                Ok(Err(e)) => error!(browser_index = index, error = %e, "browser start failed"),
                Err(e) => error!(browser_index = index, error = %e, "browser launch task failed"),
            }
        }

        let live = self.state.lock().expect("pool lock").live_count();
        if live == 0 {
            self.started.store(false, Ordering::SeqCst);
            return Err(ScraperError::PoolNotStarted);
        }
        info!(started = live, requested = self.config.browser_count, "browser pool started");
        Ok(())
    }

    /// Render one page
    pub async fn scrape(self: &Arc<Self>, request: ScrapeRequest) -> Result<ScrapeResponse, ScraperError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ScraperError::PoolNotStarted);
        }
        validate_scrape_url(&request.url)?;

        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return Err(ScraperError::PoolNotStarted);
        };
        self.active_pages.fetch_add(1, Ordering::SeqCst);

        let pool = Arc::clone(self);
        let outcome = tokio::task::spawn_blocking(move || pool.scrape_blocking(&request)).await;

        self.active_pages.fetch_sub(1, Ordering::SeqCst);

        let (result, restarts) = match outcome {
            Ok(pair) => pair,
            Err(e) => (Err(ScraperError::Scrape(format!("scrape task failed: {e}"))), Vec::new()),
        };
        for index in restarts {
            self.schedule_restart(index);
        }
        result
    }

    /// Blocking scrape body; returns the result plus browser indices that
    /// need a restart
    fn scrape_blocking(
        &self,
        request: &ScrapeRequest,
    ) -> (Result<ScrapeResponse, ScraperError>, Vec<usize>) {
        let mut restarts: Vec<usize> = Vec::new();

        // Select a connected browser, probing each candidate once
        let selected = {
            let mut state = self.state.lock().expect("pool lock");
            let (selected, dead) = state.select(|browser| browser.get_version().is_ok());
            restarts.extend(dead);
            selected
        };

        let (index, browser) = match selected {
            Some(pair) => pair,
            None => {
                // Everything is down; one inline relaunch keeps the request alive
                warn!("all browsers disconnected, attempting inline restart");
                match launch_browser(&self.config) {
                    Ok(browser) => {
                        let browser = Arc::new(browser);
                        self.state.lock().expect("pool lock").set(0, browser.clone());
                        (0, browser)
                    }
                    Err(e) => {
                        error!(error = %e, "inline browser restart failed");
                        return (Err(ScraperError::AllBrowsersDown), restarts);
                    }
                }
            }
        };

        let result = do_scrape(&browser, request, &self.config);

        // Count the request and queue a recycle at the threshold
        {
            let mut state = self.state.lock().expect("pool lock");
            state.record_request(index);
            if state.should_recycle(index, self.config.recycle_after_requests) {
                info!(browser_index = index, "recycle threshold reached");
                restarts.push(index);
            }
        }

        if let Err(ScraperError::Scrape(message)) = &result {
            // A browser that died mid-scrape is restarted for future
            // requests; this request is not retried here
            if message.to_lowercase().contains("closed") {
                warn!(browser_index = index, url = %request.url, "browser died during scrape");
                restarts.push(index);
            }
        }

        (result, restarts)
    }

    /// Restart a browser in the background; at most one restart per index
    fn schedule_restart(self: &Arc<Self>, index: usize) {
        {
            let mut state = self.state.lock().expect("pool lock");
            if !state.begin_restart(index) {
                debug!(browser_index = index, "restart already scheduled");
                return;
            }
        }

        info!(browser_index = index, "scheduling browser restart");
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let config = pool.config.clone();
            let launched = tokio::task::spawn_blocking(move || launch_browser(&config)).await;
            let mut state = pool.state.lock().expect("pool lock");
            match launched {
                Ok(Ok(browser)) => {
                    state.finish_restart(index, Some(Arc::new(browser)));
                    info!(browser_index = index, "browser restarted");
                }
                Ok(Err(e)) => {
                    state.finish_restart(index, None);
                    error!(browser_index = index, error = %e, "browser restart failed");
                }
                Err(e) => {
                    state.finish_restart(index, None);
                    error!(browser_index = index, error = %e, "browser restart task failed");
                }
            }
        });
    }

    /// Drain active pages (bounded) and close every browser
    pub async fn shutdown(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(active_pages = self.active_pages(), "stopping browser pool");

        let mut waited = 0;
        while self.active_pages() > 0 && waited < self.config.shutdown_drain_secs {
            tokio::time::sleep(Duration::from_secs(1)).await;
            waited += 1;
        }
        if self.active_pages() > 0 {
            warn!(remaining_pages = self.active_pages(), "forcing browser pool shutdown");
        }

        self.state.lock().expect("pool lock").clear();
        info!("browser pool stopped");
    }
}

/// Launch one browser with the pool's options
fn launch_browser(config: &ScraperConfig) -> anyhow::Result<Browser> {
    let mut builder = LaunchOptions::default_builder();
    builder
        .headless(config.headless)
        // The pool owns browser lifetime; never idle-kill them underneath it
        .idle_browser_timeout(Duration::from_secs(86_400));
    if let Some(proxy) = &config.proxy {
        builder.proxy_server(Some(proxy.as_str()));
    }
    let options = builder
        .build()
        .map_err(|e| anyhow::anyhow!("launch options: {e}"))?;
    Browser::new(options)
}

/// Render one page on the given browser
fn do_scrape(
    browser: &Browser,
    request: &ScrapeRequest,
    config: &ScraperConfig,
) -> Result<ScrapeResponse, ScraperError> {
    let scrape = || -> Result<ScrapeResponse, ScraperError> {
        let tab = browser
            .new_tab()
            .map_err(|e| ScraperError::Scrape(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(request.timeout));

        let result = render_page(&tab, request, config);
        // Fresh tab per request, closed regardless of outcome
        let _ = tab.close(true);
        result
    };

    debug!(url = %request.url, timeout = request.timeout, "scrape started");
    let result = scrape();
    match &result {
        Ok(response) => debug!(
            url = %request.url,
            status = response.page_status_code,
            content_length = response.content.len(),
            "scrape completed"
        ),
        Err(e) => warn!(url = %request.url, error = %e, "scrape failed"),
    }
    result
}

fn render_page(
    tab: &Arc<Tab>,
    request: &ScrapeRequest,
    config: &ScraperConfig,
) -> Result<ScrapeResponse, ScraperError> {
    let scrape_err = |e: anyhow::Error| ScraperError::Scrape(e.to_string());

    // Standard headers minus the fingerprint-owned set, caller's on top
    let merged = merge_headers(request.headers.as_ref());
    let header_refs: HashMap<&str, &str> = merged
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    tab.set_extra_http_headers(header_refs).map_err(scrape_err)?;

    // One interceptor both aborts ad requests and collects AJAX URLs
    let discovered: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let responses: Arc<Mutex<Vec<(String, u16, String)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let base_url = request.url.clone();
        let capture = request.discover_ajax;
        let sink = discovered.clone();
        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport: Arc<Transport>, _session: SessionId, event: RequestPausedEvent| {
                let url = event.params.request.url.clone();
                if is_ad_domain(&url) {
                    return RequestPausedDecision::Fail(FailRequest {
                        request_id: event.params.request_id.clone(),
                        error_reason: ErrorReason::Aborted,
                    });
                }
                if capture && looks_like_ajax(&url, &base_url) {
                    sink.lock().expect("discovery lock").insert(url);
                }
                RequestPausedDecision::Continue(None)
            },
        );
        tab.enable_fetch(None, None).map_err(scrape_err)?;
        tab.enable_request_interception(interceptor).map_err(scrape_err)?;
    }
    {
        let sink = responses.clone();
        tab.register_response_handling("gleaner-scrape", Box::new(move |params, _fetch_body| {
            sink.lock().expect("response lock").push((
                params.response.url.clone(),
                params.response.status as u16,
                params.response.mime_type.clone(),
            ));
        }))
        .map_err(scrape_err)?;
    }

    tab.navigate_to(&request.url).map_err(scrape_err)?;
    // Tier 1: navigation/DOM load is mandatory
    tab.wait_until_navigated().map_err(scrape_err)?;
    // Tiers 2 and 3: bounded settle, then content-length stability
    wait_for_content_ready(tab, config);

    if request.wait_after_load > 0 {
        std::thread::sleep(Duration::from_millis(request.wait_after_load));
    }

    let discovered_urls = if request.discover_ajax {
        discover_ajax_urls(tab, config);
        let set = discovered.lock().expect("discovery lock");
        (!set.is_empty()).then(|| set.iter().cloned().collect::<Vec<_>>())
    } else {
        None
    };

    if let Some(selector) = &request.check_selector {
        let bound = Duration::from_millis(request.timeout.min(10_000));
        if tab.wait_for_element_with_custom_timeout(selector, bound).is_err() {
            warn!(selector = %selector, "selector not found");
            return Err(ScraperError::SelectorNotFound);
        }
    }

    // JSON and plain text come back as the raw body, not a DOM rendering
    let document_type = eval_string(tab, "document.contentType");
    let is_raw = document_type
        .as_deref()
        .map(|t| t.contains("json") || t.contains("text/plain"))
        .unwrap_or(false);
    let content = if is_raw {
        eval_string(tab, "document.body ? document.body.innerText : ''").unwrap_or_default()
    } else {
        inline_iframes(tab);
        tab.get_content().map_err(scrape_err)?
    };

    // Status of the main document; 0 when nothing was observed
    let final_url = tab.get_url();
    let captured = responses.lock().expect("response lock");
    let main = captured
        .iter()
        .find(|(url, _, _)| *url == final_url || *url == request.url)
        .or_else(|| captured.first());
    let (status, mime) = match main {
        Some((_, status, mime)) => (*status, Some(mime.clone())),
        None => (0, document_type.clone()),
    };
    let page_error = get_error_message((status > 0).then_some(status)).map(str::to_string);
    if let Some(message) = &page_error {
        warn!(status, error = %message, "page error status");
    }

    Ok(ScrapeResponse {
        content,
        page_status_code: status,
        page_error,
        content_type: mime.or(document_type),
        discovered_urls,
    })
}

/// Tiered readiness: bounded readyState settle, then body-length stability
fn wait_for_content_ready(tab: &Arc<Tab>, config: &ScraperConfig) {
    let deadline = Instant::now() + Duration::from_millis(config.networkidle_timeout_ms);
    while Instant::now() < deadline {
        if eval_string(tab, "document.readyState").as_deref() == Some("complete") {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let interval = Duration::from_millis(config.content_stability_interval_ms);
    let mut last_length = 0u64;
    let mut stable = 0u32;
    // Bounded iterations so a perpetually-mutating page cannot wedge us
    for _ in 0..config.content_stability_checks * 2 {
        let length = tab
            .evaluate("document.body ? document.body.innerHTML.length : 0", false)
            .ok()
            .and_then(|obj| obj.value)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if length == last_length {
            stable += 1;
            if stable >= config.content_stability_checks {
                debug!(checks = stable, "content stable");
                return;
            }
        } else {
            stable = 0;
            last_length = length;
        }
        std::thread::sleep(interval);
    }
    debug!("content stability max iterations reached");
}

/// Click through likely-AJAX elements so the interceptor sees their requests
fn discover_ajax_urls(tab: &Arc<Tab>, config: &ScraperConfig) {
    let elements = tab.find_elements(CLICKABLE_SELECTORS).unwrap_or_default();
    debug!(count = elements.len(), "ajax discovery elements found");

    let mut clicked = 0;
    for element in &elements {
        if clicked >= config.ajax_discovery_max_clicks {
            break;
        }
        // Real navigation links would leave the page; skip them
        if let Ok(Some(href)) = element.get_attribute_value("href") {
            let stays = matches!(href.as_str(), "#" | "javascript:void(0)" | "javascript:;" | "");
            if !stays
                && (href.starts_with('/')
                    || href.starts_with("http")
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:"))
            {
                continue;
            }
        }
        if element.click().is_err() {
            continue;
        }
        clicked += 1;
        // Sites often delay their AJAX after a click
        std::thread::sleep(Duration::from_millis(1000));
    }
    debug!(clicked, "ajax discovery complete");
}

/// Replace same-origin iframes with their body content in the DOM
///
/// Cross-origin frames throw inside the page script and are left untouched.
fn inline_iframes(tab: &Arc<Tab>) {
    let script = r#"
        (() => {
            let count = 0;
            document.querySelectorAll('iframe').forEach((iframe) => {
                try {
                    const doc = iframe.contentDocument ||
                        (iframe.contentWindow ? iframe.contentWindow.document : null);
                    if (doc && doc.body) {
                        const div = document.createElement('div');
                        div.setAttribute('data-iframe-src', iframe.src || '');
                        div.setAttribute('data-original-tag', 'iframe');
                        div.innerHTML = doc.body.innerHTML;
                        iframe.parentNode.replaceChild(div, iframe);
                        count++;
                    }
                } catch (e) {}
            });
            return count;
        })()
    "#;
    if let Ok(result) = tab.evaluate(script, false) {
        if let Some(count) = result.value.and_then(|v| v.as_u64()) {
            if count > 0 {
                debug!(count, "iframes inlined");
            }
        }
    }
}

fn eval_string(tab: &Arc<Tab>, expression: &str) -> Option<String> {
    tab.evaluate(expression, false)
        .ok()
        .and_then(|obj| obj.value)
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Whether a request URL is worth reporting as a discovered AJAX endpoint
fn looks_like_ajax(url: &str, base_url: &str) -> bool {
    if url == base_url || is_ad_domain(url) {
        return false;
    }
    let path = url.split('?').next().unwrap_or(url);
    if ASSET_SUFFIXES.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    let lowered = url.to_lowercase();
    lowered.contains("ajax") || lowered.contains("api") || lowered.contains("xhr")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_cycles_through_live_slots() {
        let mut pool: RoundRobin<&'static str> = RoundRobin::new(3);
        pool.set(0, "a");
        pool.set(1, "b");
        pool.set(2, "c");

        let picks: Vec<&str> = (0..4)
            .map(|_| pool.select(|_| true).0.unwrap().1)
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_dead_slot_is_skipped_and_reported() {
        let mut pool: RoundRobin<&'static str> = RoundRobin::new(3);
        pool.set(0, "a");
        pool.set(1, "dead");
        pool.set(2, "c");
        // Move the cursor onto the dead slot
        pool.select(|_| true);

        let (selected, dead) = pool.select(|value| *value != "dead");
        assert_eq!(selected.unwrap(), (2, "c"));
        assert_eq!(dead, vec![1]);
    }

    #[test]
    fn test_all_dead_returns_every_index() {
        let mut pool: RoundRobin<&'static str> = RoundRobin::new(2);
        pool.set(0, "x");
        pool.set(1, "y");
        let (selected, dead) = pool.select(|_| false);
        assert!(selected.is_none());
        assert_eq!(dead.len(), 2);
    }

    #[test]
    fn test_recycle_threshold() {
        let mut pool: RoundRobin<&'static str> = RoundRobin::new(1);
        pool.set(0, "a");
        for _ in 0..9 {
            pool.record_request(0);
        }
        assert!(!pool.should_recycle(0, 10));
        pool.record_request(0);
        assert!(pool.should_recycle(0, 10));
        // Above threshold still recycles
        pool.record_request(0);
        assert!(pool.should_recycle(0, 10));
    }

    #[test]
    fn test_recycle_disabled_at_zero_or_negative() {
        let mut pool: RoundRobin<&'static str> = RoundRobin::new(1);
        pool.set(0, "a");
        for _ in 0..1000 {
            pool.record_request(0);
        }
        assert!(!pool.should_recycle(0, 0));
        assert!(!pool.should_recycle(0, -1));
    }

    #[test]
    fn test_recycle_handles_out_of_range_index() {
        let pool: RoundRobin<&'static str> = RoundRobin::new(1);
        assert!(!pool.should_recycle(5, 10));
    }

    #[test]
    fn test_restart_resets_counter_only_on_success() {
        let mut pool: RoundRobin<&'static str> = RoundRobin::new(1);
        pool.set(0, "old");
        for _ in 0..7 {
            pool.record_request(0);
        }

        assert!(pool.begin_restart(0));
        // A second restart for the same index is refused while in flight
        assert!(!pool.begin_restart(0));

        pool.finish_restart(0, None);
        assert_eq!(pool.request_count(0), 7, "failed restart keeps the counter");

        assert!(pool.begin_restart(0));
        pool.finish_restart(0, Some("fresh"));
        assert_eq!(pool.request_count(0), 0, "successful restart resets the counter");
        let (selected, _) = pool.select(|_| true);
        assert_eq!(selected.unwrap().1, "fresh");
    }

    #[test]
    fn test_looks_like_ajax_filters() {
        let base = "https://example.com/page";
        assert!(looks_like_ajax("https://example.com/api/items?year=2020", base));
        assert!(looks_like_ajax("https://example.com/ajax/load", base));
        assert!(!looks_like_ajax(base, base));
        assert!(!looks_like_ajax("https://example.com/app.js", base));
        assert!(!looks_like_ajax("https://example.com/api/style.css?v=2", base));
        assert!(!looks_like_ajax("https://google-analytics.com/api/collect", base));
        assert!(!looks_like_ajax("https://example.com/other-page", base));
    }

    // Requires a local Chromium; run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_pool_scrape_integration() {
        let pool = BrowserPool::new(ScraperConfig {
            browser_count: 1,
            ..ScraperConfig::default()
        });
        pool.start().await.unwrap();

        let response = pool
            .scrape(ScrapeRequest {
                url: "https://example.com".to_string(),
                timeout: 30_000,
                wait_after_load: 0,
                headers: None,
                check_selector: None,
                skip_tls_verification: false,
                discover_ajax: false,
            })
            .await
            .unwrap();
        assert_eq!(response.page_status_code, 200);
        assert!(response.content.contains("Example Domain"));

        pool.shutdown().await;
    }
}
