//! Load and network-idle detection for one page session.
//!
//! [`NetworkIdleTracker`] is a pure state machine over CDP events; the async
//! [`wait_for_load_and_idle`] feeds it from a subscription until the page is
//! idle or the deadline passes.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

use super::protocol::CdpEvent;

/// How often the idle condition is re-checked while no events arrive.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where a navigation ended up when waiting stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// `load` fired and the network went quiet.
    Idle,
    /// `load` fired but requests kept flowing until the deadline.
    LoadedBusy,
    /// `load` never fired.
    NotLoaded,
}

#[derive(Debug)]
pub struct NetworkIdleTracker {
    inflight: HashSet<String>,
    max_inflight: usize,
    quiet: Duration,
    loaded: bool,
    idle_since: Option<Instant>,
}

impl NetworkIdleTracker {
    /// Idle means at most `max_inflight` requests outstanding for `quiet`.
    pub fn new(max_inflight: usize, quiet: Duration, now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            max_inflight,
            quiet,
            loaded: false,
            idle_since: Some(now),
        }
    }

    pub fn observe(&mut self, event: &CdpEvent, now: Instant) {
        match event.method.as_str() {
            "Page.loadEventFired" => self.loaded = true,
            "Network.requestWillBeSent" => {
                if let Some(id) = event.request_id() {
                    self.inflight.insert(id.to_string());
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(id) = event.request_id() {
                    self.inflight.remove(id);
                }
            }
            _ => return,
        }
        self.refresh(now);
    }

    fn refresh(&mut self, now: Instant) {
        if self.inflight.len() > self.max_inflight {
            self.idle_since = None;
        } else if self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.loaded
            && self
                .idle_since
                .is_some_and(|since| now.saturating_duration_since(since) >= self.quiet)
    }

    pub fn state(&self, now: Instant) -> LoadState {
        if self.is_idle(now) {
            LoadState::Idle
        } else if self.loaded {
            LoadState::LoadedBusy
        } else {
            LoadState::NotLoaded
        }
    }
}

/// Feed `events` for `session_id` into `tracker` until the page is idle or
/// `timeout` elapses.
pub async fn wait_for_load_and_idle(
    events: &mut broadcast::Receiver<CdpEvent>,
    session_id: &str,
    tracker: &mut NetworkIdleTracker,
    timeout: Duration,
) -> LoadState {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if tracker.is_idle(now) {
            return LoadState::Idle;
        }
        if now >= deadline {
            let state = tracker.state(now);
            debug!(
                "navigation wait ended: {:?}, {} request(s) in flight",
                state,
                tracker.inflight()
            );
            return state;
        }
        let tick = POLL_INTERVAL.min(deadline - now);
        match tokio::time::timeout(tick, events.recv()).await {
            Ok(Ok(event)) if event.is_for(session_id) => tracker.observe(&event, Instant::now()),
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(RecvError::Lagged(n))) => trace!("event subscriber lagged by {}", n),
            Ok(Err(RecvError::Closed)) => return tracker.state(Instant::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(method: &str, request_id: Option<&str>) -> CdpEvent {
        CdpEvent {
            method: method.to_string(),
            params: match request_id {
                Some(id) => json!({ "requestId": id }),
                None => json!({}),
            },
            session_id: Some("S".into()),
        }
    }

    #[test]
    fn not_idle_before_load() {
        let t0 = Instant::now();
        let tracker = NetworkIdleTracker::new(2, Duration::from_millis(500), t0);
        assert!(!tracker.is_idle(t0 + Duration::from_secs(5)));
        assert_eq!(tracker.state(t0 + Duration::from_secs(5)), LoadState::NotLoaded);
    }

    #[test]
    fn idle_after_quiet_window_with_few_requests() {
        let t0 = Instant::now();
        let mut tracker = NetworkIdleTracker::new(2, Duration::from_millis(500), t0);
        tracker.observe(&ev("Network.requestWillBeSent", Some("1")), t0);
        tracker.observe(&ev("Network.requestWillBeSent", Some("2")), t0);
        tracker.observe(&ev("Page.loadEventFired", None), t0);
        assert_eq!(tracker.inflight(), 2);
        assert!(!tracker.is_idle(t0 + Duration::from_millis(100)));
        assert!(tracker.is_idle(t0 + Duration::from_millis(600)));
    }

    #[test]
    fn busy_network_resets_quiet_window() {
        let t0 = Instant::now();
        let mut tracker = NetworkIdleTracker::new(2, Duration::from_millis(500), t0);
        tracker.observe(&ev("Page.loadEventFired", None), t0);
        for id in ["a", "b", "c"] {
            tracker.observe(&ev("Network.requestWillBeSent", Some(id)), t0);
        }
        let t1 = t0 + Duration::from_millis(800);
        assert!(!tracker.is_idle(t1));
        assert_eq!(tracker.state(t1), LoadState::LoadedBusy);

        tracker.observe(&ev("Network.loadingFinished", Some("a")), t1);
        assert!(!tracker.is_idle(t1 + Duration::from_millis(499)));
        assert!(tracker.is_idle(t1 + Duration::from_millis(500)));
    }

    #[test]
    fn failed_requests_count_as_done() {
        let t0 = Instant::now();
        let mut tracker = NetworkIdleTracker::new(0, Duration::from_millis(10), t0);
        tracker.observe(&ev("Network.requestWillBeSent", Some("x")), t0);
        tracker.observe(&ev("Network.loadingFailed", Some("x")), t0);
        tracker.observe(&ev("Page.loadEventFired", None), t0);
        assert!(tracker.is_idle(t0 + Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn wait_returns_idle_once_load_fires() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut tracker = NetworkIdleTracker::new(2, Duration::from_millis(20), Instant::now());
        tx.send(ev("Page.loadEventFired", None)).unwrap();
        let state = wait_for_load_and_idle(&mut rx, "S", &mut tracker, Duration::from_secs(5)).await;
        assert_eq!(state, LoadState::Idle);
    }

    #[tokio::test]
    async fn wait_ignores_other_sessions_and_times_out() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut tracker = NetworkIdleTracker::new(2, Duration::from_millis(20), Instant::now());
        let mut other = ev("Page.loadEventFired", None);
        other.session_id = Some("OTHER".into());
        tx.send(other).unwrap();
        let state = wait_for_load_and_idle(&mut rx, "S", &mut tracker, Duration::from_millis(200)).await;
        assert_eq!(state, LoadState::NotLoaded);
    }
}
