use crate::model::ReferenceConfig;
use std::time::{Duration, Instant};

pub const OPTIONS_VISIBLE: usize = 8;
// How close the cursor may get to the end of the accumulated list before the
// next page is requested.
pub const SCROLL_AHEAD: usize = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

// Everything the loader needs to fetch one option page. The version travels
// with the request and comes back with the response.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub config: ReferenceConfig,
    pub query: String,
    pub page: u32,
    pub version: u64,
}

// Searchable, paged picker state bound to a single scalar field. Pages
// accumulate as the cursor approaches the end of the list; a search restart
// bumps `version` so that completions of superseded requests are dropped.
#[derive(Debug)]
pub struct RefSelectState {
    pub config: Option<ReferenceConfig>,
    pub search: String,
    pending_since: Option<Instant>,
    pub options: Vec<Choice>,
    pub page: u32,
    pub exhausted: bool,
    pub in_flight: bool,
    pub version: u64,
    pub cursor: usize,
    pub offset: usize,
    selected: Option<Choice>,
    // Pre-existing value whose label has not been resolved yet; shown raw.
    raw_value: Option<String>,
    pub open: bool,
}

impl RefSelectState {
    pub fn new(config: Option<ReferenceConfig>) -> Self {
        Self {
            config,
            search: String::new(),
            pending_since: None,
            options: Vec::new(),
            page: 1,
            exhausted: false,
            in_flight: false,
            version: 0,
            cursor: 0,
            offset: 0,
            selected: None,
            raw_value: None,
            open: false,
        }
    }

    // Swap the lookup target (conditional fields). Everything cached belongs
    // to the old endpoint; the version bump also retires in-flight fetches.
    pub fn rebind(&mut self, config: Option<ReferenceConfig>) {
        self.config = config;
        self.search.clear();
        self.pending_since = None;
        self.options.clear();
        self.page = 1;
        self.exhausted = false;
        self.in_flight = false;
        self.version += 1;
        self.cursor = 0;
        self.offset = 0;
        self.selected = None;
        self.raw_value = None;
        self.open = false;
    }

    pub fn bind_existing(&mut self, value: &str) {
        self.selected = None;
        self.raw_value = if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
    }

    pub fn value(&self) -> Option<String> {
        self.selected
            .as_ref()
            .map(|c| c.value.clone())
            .or_else(|| self.raw_value.clone())
    }

    pub fn display(&self) -> Option<String> {
        self.selected
            .as_ref()
            .map(|c| c.label.clone())
            .or_else(|| self.raw_value.clone())
    }

    pub fn open(&mut self) -> Option<FetchRequest> {
        self.open = true;
        if self.options.is_empty() && !self.in_flight && !self.exhausted {
            return self.restart();
        }
        None
    }

    // Mount-time label lookup for a pre-existing value: an unfiltered first
    // page, without opening the dropdown. If the value is not on that page
    // the raw id keeps showing; that is a presentation gap, not an error.
    pub fn resolve_label(&mut self) -> Option<FetchRequest> {
        if self.raw_value.is_none() || !self.options.is_empty() || self.in_flight {
            return None;
        }
        self.restart()
    }

    pub fn close(&mut self) {
        self.open = false;
        self.pending_since = None;
    }

    pub fn input(&mut self, c: char, now: Instant) {
        self.search.push(c);
        self.pending_since = Some(now);
    }

    pub fn backspace(&mut self, now: Instant) {
        if self.search.pop().is_some() {
            self.pending_since = Some(now);
        }
    }

    // Debounce pump, called from the tick loop: only after the quiet interval
    // has elapsed since the last keystroke does the (single) fetch go out.
    pub fn pump(&mut self, now: Instant) -> Option<FetchRequest> {
        let cfg = self.config.as_ref()?;
        let since = self.pending_since?;
        if now.duration_since(since) < Duration::from_millis(cfg.debounce_ms) {
            return None;
        }
        self.restart()
    }

    fn restart(&mut self) -> Option<FetchRequest> {
        let cfg = self.config.as_ref()?.clone();
        self.pending_since = None;
        self.version += 1;
        self.options.clear();
        self.page = 1;
        self.exhausted = false;
        self.in_flight = true;
        self.cursor = 0;
        self.offset = 0;
        Some(FetchRequest {
            config: cfg,
            query: self.search.clone(),
            page: 1,
            version: self.version,
        })
    }

    pub fn move_cursor(&mut self, delta: i32) -> Option<FetchRequest> {
        if self.options.is_empty() {
            return None;
        }
        if delta < 0 {
            self.cursor = self.cursor.saturating_sub(delta.unsigned_abs() as usize);
        } else {
            self.cursor = (self.cursor + delta as usize).min(self.options.len() - 1);
        }
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + OPTIONS_VISIBLE {
            self.offset = self.cursor + 1 - OPTIONS_VISIBLE;
        }
        self.maybe_next_page()
    }

    // Page fetches are serialized: nothing is requested while one is pending.
    fn maybe_next_page(&mut self) -> Option<FetchRequest> {
        if self.exhausted || self.in_flight || self.options.is_empty() {
            return None;
        }
        if self.cursor + SCROLL_AHEAD < self.options.len() {
            return None;
        }
        let cfg = self.config.as_ref()?.clone();
        self.page += 1;
        self.in_flight = true;
        Some(FetchRequest {
            config: cfg,
            query: self.search.clone(),
            page: self.page,
            version: self.version,
        })
    }

    // Apply a completed page. Stale completions (older version) are dropped
    // whole; the current query has already replaced them.
    pub fn apply(&mut self, version: u64, items: Vec<Choice>) {
        if version != self.version {
            return;
        }
        self.in_flight = false;
        if let Some(cfg) = &self.config {
            if (items.len() as u32) < cfg.page_size {
                self.exhausted = true;
            }
        }
        self.options.extend(items);
        if self.selected.is_none() {
            if let Some(raw) = &self.raw_value {
                if let Some(found) = self.options.iter().find(|c| &c.value == raw) {
                    self.selected = Some(found.clone());
                    self.raw_value = None;
                }
            }
        }
    }

    // Fetch failure: drop the pending flag, keep whatever is cached. The
    // bound value is untouched and no form error is raised.
    pub fn apply_error(&mut self, version: u64) {
        if version == self.version {
            self.in_flight = false;
        }
    }

    pub fn choose(&mut self) -> bool {
        if let Some(c) = self.options.get(self.cursor) {
            self.selected = Some(c.clone());
            self.raw_value = None;
            self.open = false;
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.raw_value = None;
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(page_size: u32, debounce_ms: u64) -> ReferenceConfig {
        let mut c: ReferenceConfig = serde_yaml::from_str("endpoint: brands").unwrap();
        c.page_size = page_size;
        c.debounce_ms = debounce_ms;
        c
    }

    fn batch(from: usize, n: usize) -> Vec<Choice> {
        (from..from + n)
            .map(|i| Choice {
                label: format!("Item {i}"),
                value: i.to_string(),
            })
            .collect()
    }

    #[test]
    fn debounce_issues_one_fetch_for_the_last_query() {
        let mut st = RefSelectState::new(Some(cfg(10, 500)));
        let t0 = Instant::now();
        st.input('a', t0);
        st.input('b', t0 + Duration::from_millis(50));
        st.input('c', t0 + Duration::from_millis(100));
        // Still inside the quiet interval.
        assert!(st.pump(t0 + Duration::from_millis(300)).is_none());
        let req = st.pump(t0 + Duration::from_millis(700)).expect("fetch fires");
        assert_eq!(req.query, "abc");
        assert_eq!(req.page, 1);
        // Fired once; nothing further is pending.
        assert!(st.pump(t0 + Duration::from_millis(2000)).is_none());
    }

    #[test]
    fn stale_versions_are_ignored() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        let t0 = Instant::now();
        st.input('a', t0);
        let old = st.pump(t0 + Duration::from_millis(200)).unwrap();
        // A newer query supersedes the one in flight.
        st.input('b', t0 + Duration::from_millis(300));
        let new = st.pump(t0 + Duration::from_millis(500)).unwrap();
        assert!(new.version > old.version);
        st.apply(old.version, batch(0, 10));
        assert!(st.options.is_empty());
        st.apply(new.version, batch(0, 10));
        assert_eq!(st.options.len(), 10);
    }

    #[test]
    fn scroll_accumulates_pages_until_a_short_batch() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        let req = st.open().expect("initial fetch");
        st.apply(req.version, batch(0, 10));
        assert!(!st.exhausted);
        // Cursor near the end pulls page 2.
        let mut next = None;
        for _ in 0..9 {
            if let Some(r) = st.move_cursor(1) {
                next = Some(r);
                break;
            }
        }
        let r2 = next.expect("page 2 requested");
        assert_eq!(r2.page, 2);
        // While it is pending, further scrolling stays quiet.
        assert!(st.move_cursor(1).is_none());
        st.apply(r2.version, batch(10, 10));
        let mut r3 = None;
        for _ in 0..19 {
            if let Some(r) = st.move_cursor(1) {
                r3 = Some(r);
                break;
            }
        }
        let r3 = r3.expect("page 3 requested");
        assert_eq!(r3.page, 3);
        // Page 3 comes back short: the source is exhausted.
        st.apply(r3.version, batch(20, 4));
        assert!(st.exhausted);
        assert_eq!(st.options.len(), 24);
        for _ in 0..30 {
            assert!(st.move_cursor(1).is_none());
        }
    }

    #[test]
    fn existing_value_resolves_to_a_label_when_found() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        st.bind_existing("2");
        assert_eq!(st.display().as_deref(), Some("2"));
        let req = st.open().unwrap();
        st.apply(req.version, batch(0, 5));
        assert_eq!(st.display().as_deref(), Some("Item 2"));
        assert_eq!(st.value().as_deref(), Some("2"));
    }

    #[test]
    fn resolve_label_fetches_once_without_opening() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        st.bind_existing("2");
        let req = st.resolve_label().expect("label fetch");
        assert_eq!(req.query, "");
        assert!(!st.open);
        // Serialized: nothing else goes out while it is pending.
        assert!(st.resolve_label().is_none());
        st.apply(req.version, batch(0, 5));
        assert_eq!(st.display().as_deref(), Some("Item 2"));
        // Nothing left to resolve.
        assert!(st.resolve_label().is_none());
    }

    #[test]
    fn unresolved_value_keeps_showing_raw() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        st.bind_existing("999");
        let req = st.open().unwrap();
        st.apply(req.version, batch(0, 5));
        assert_eq!(st.display().as_deref(), Some("999"));
    }

    #[test]
    fn fetch_failure_is_soft() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        let req = st.open().unwrap();
        st.apply(req.version, batch(0, 10));
        st.bind_existing("3");
        let t0 = Instant::now();
        st.input('x', t0);
        let req2 = st.pump(t0 + Duration::from_millis(200)).unwrap();
        st.apply_error(req2.version);
        assert!(!st.in_flight);
        // The bound value survives the failed search.
        assert_eq!(st.value().as_deref(), Some("3"));
    }

    #[test]
    fn choose_and_clear_drive_the_bound_value() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        let req = st.open().unwrap();
        st.apply(req.version, batch(0, 3));
        st.cursor = 1;
        assert!(st.choose());
        assert_eq!(st.value().as_deref(), Some("1"));
        assert_eq!(st.display().as_deref(), Some("Item 1"));
        assert!(!st.open);
        st.clear_selection();
        assert!(st.value().is_none());
    }

    #[test]
    fn rebind_drops_cache_and_retires_in_flight_fetches() {
        let mut st = RefSelectState::new(Some(cfg(10, 100)));
        let req = st.open().unwrap();
        st.apply(req.version, batch(0, 10));
        st.cursor = 9;
        let pending = st.maybe_next_page();
        st.rebind(Some(cfg(10, 100)));
        assert!(st.options.is_empty());
        if let Some(p) = pending {
            st.apply(p.version, batch(10, 10));
        }
        assert!(st.options.is_empty());
        assert!(st.value().is_none());
    }
}
