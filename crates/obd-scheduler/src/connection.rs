//! Link connection state machine
//!
//! Two recovery paths exist. A link that was never found is retried once
//! every [`RETRY_INTERVAL`] while no PIDs are polled. A link lost mid-session
//! is retried without bound, and a new session starts once it is back.

use obd_protocol::LinkDriver;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Initialization attempts made at boot before falling back to periodic retry
pub const INITIAL_ATTEMPTS: u32 = 3;

/// Interval between init attempts while disconnected
pub const RETRY_INTERVAL: Duration = Duration::from_millis(10_000);

/// Consecutive failed queries that trigger reconnection
pub const ERROR_THRESHOLD: u32 = 5;

/// Pause between failed init attempts during reconnection
pub const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Health of the diagnostic link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Blocked in reconnection after the link was lost
    Sleeping,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

/// Result of a periodic retry while disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Less than [`RETRY_INTERVAL`] since the last attempt
    NotDue,
    /// The attempt failed
    Failed,
    /// The link came up
    Connected,
}

/// Owns the link state, the consecutive error counter and the session clock
#[derive(Debug)]
pub struct ConnectionManager {
    state: LinkState,
    /// Consecutive failed queries
    errors: u32,
    /// Start of the current connection attempt
    session_clock: Instant,
    /// Logical session, advanced on every reconnection
    session_index: u32,
    reconnects: u64,
}

impl ConnectionManager {
    /// Start disconnected with the session clock at now
    pub fn new() -> Self {
        Self {
            state: LinkState::Disconnected,
            errors: 0,
            session_clock: Instant::now(),
            session_index: 0,
            reconnects: 0,
        }
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether PIDs may be polled
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Consecutive failed queries so far
    pub fn error_count(&self) -> u32 {
        self.errors
    }

    /// Index of the current session
    pub fn session_index(&self) -> u32 {
        self.session_index
    }

    /// Completed reconnections
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    fn transition(&mut self, to: LinkState) {
        if self.state != to {
            info!("Link {} -> {}", self.state, to);
            self.state = to;
        }
    }

    async fn attempt<L: LinkDriver + ?Sized>(&mut self, link: &mut L) -> bool {
        self.session_clock = Instant::now();
        self.transition(LinkState::Connecting);
        match link.initialize().await {
            Ok(()) => {
                self.errors = 0;
                self.transition(LinkState::Connected);
                true
            }
            Err(e) => {
                warn!("Link initialization failed: {}", e);
                self.transition(LinkState::Disconnected);
                false
            }
        }
    }

    /// Bounded acquisition at boot: up to [`INITIAL_ATTEMPTS`] init calls
    pub async fn acquire<L: LinkDriver + ?Sized>(&mut self, link: &mut L) -> bool {
        if self.is_connected() {
            return true;
        }
        for attempt in 1..=INITIAL_ATTEMPTS {
            if self.attempt(link).await {
                info!("Link acquired on attempt {}", attempt);
                return true;
            }
        }
        warn!(
            "Link not found after {} attempts, retrying every {}s",
            INITIAL_ATTEMPTS,
            RETRY_INTERVAL.as_secs()
        );
        false
    }

    /// Whether a periodic retry would run now
    pub fn retry_due(&self) -> bool {
        self.state == LinkState::Disconnected && self.session_clock.elapsed() >= RETRY_INTERVAL
    }

    /// One rate-limited init attempt while disconnected
    pub async fn poll_disconnected<L: LinkDriver + ?Sized>(&mut self, link: &mut L) -> RetryOutcome {
        if !self.retry_due() {
            return RetryOutcome::NotDue;
        }
        let connected = self.attempt(link).await;
        self.session_clock = Instant::now();
        if connected {
            RetryOutcome::Connected
        } else {
            RetryOutcome::Failed
        }
    }

    /// Reset the error counter after a decoded response
    pub fn record_success(&mut self) {
        if self.errors > 0 {
            debug!("Clearing {} consecutive query failures", self.errors);
        }
        self.errors = 0;
    }

    /// Count a failed query; returns true once the reconnect threshold is reached
    pub fn record_failure(&mut self) -> bool {
        self.errors += 1;
        self.errors >= ERROR_THRESHOLD
    }

    /// Block until the link is back, then open a new session. Returns the new session index.
    pub async fn reconnect<L: LinkDriver + ?Sized>(&mut self, link: &mut L) -> u32 {
        warn!("{} consecutive query failures, reconnecting", self.errors);
        self.session_clock = Instant::now();
        self.transition(LinkState::Sleeping);

        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match link.initialize().await {
                Ok(()) => break,
                Err(e) => {
                    debug!("Reconnect attempt {} failed: {}", attempts, e);
                    tokio::time::sleep(RECONNECT_PAUSE).await;
                }
            }
        }

        self.errors = 0;
        self.session_index += 1;
        self.reconnects += 1;
        self.transition(LinkState::Connected);
        info!(
            "Link restored after {} attempts, starting session {}",
            attempts, self.session_index
        );
        self.session_index
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::MockLink;

    #[tokio::test(start_paused = true)]
    async fn test_boot_connects_first_try() {
        let mut link = MockLink::new();
        let mut conn = ConnectionManager::new();
        assert_eq!(conn.state(), LinkState::Disconnected);

        assert!(conn.acquire(&mut link).await);
        assert_eq!(conn.state(), LinkState::Connected);
        assert_eq!(link.init_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_succeeds_on_third_attempt() {
        let mut link = MockLink::new();
        link.script_init([false, false]);
        let mut conn = ConnectionManager::new();

        assert!(conn.acquire(&mut link).await);
        assert_eq!(link.init_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_gives_up_after_three_attempts() {
        let mut link = MockLink::new();
        link.script_init([false, false, false]);
        let mut conn = ConnectionManager::new();

        assert!(!conn.acquire(&mut link).await);
        assert_eq!(conn.state(), LinkState::Disconnected);
        assert_eq!(link.init_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_retry_is_rate_limited() {
        let mut link = MockLink::new();
        link.script_init([false, false, false, false]);
        let mut conn = ConnectionManager::new();
        conn.acquire(&mut link).await;

        assert_eq!(conn.poll_disconnected(&mut link).await, RetryOutcome::NotDue);
        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(conn.poll_disconnected(&mut link).await, RetryOutcome::NotDue);
        assert_eq!(link.init_attempts(), 3);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(conn.poll_disconnected(&mut link).await, RetryOutcome::Failed);
        assert_eq!(link.init_attempts(), 4);

        // The failed attempt restarted the clock
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(conn.poll_disconnected(&mut link).await, RetryOutcome::NotDue);
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(conn.poll_disconnected(&mut link).await, RetryOutcome::Connected);
        assert_eq!(conn.state(), LinkState::Connected);
        assert_eq!(link.init_attempts(), 5);
    }

    #[test]
    fn test_error_threshold() {
        let mut conn = ConnectionManager::new();
        for _ in 0..ERROR_THRESHOLD - 1 {
            assert!(!conn.record_failure());
        }
        assert_eq!(conn.error_count(), 4);
        assert!(conn.record_failure());
    }

    #[test]
    fn test_success_resets_errors() {
        let mut conn = ConnectionManager::new();
        for _ in 0..4 {
            conn.record_failure();
        }
        conn.record_success();
        assert_eq!(conn.error_count(), 0);
        assert!(!conn.record_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_blocks_until_link_returns() {
        let mut link = MockLink::new();
        let mut conn = ConnectionManager::new();
        conn.acquire(&mut link).await;
        for _ in 0..ERROR_THRESHOLD {
            conn.record_failure();
        }

        link.script_init([false, false, false, false, false, false]);
        let session = conn.reconnect(&mut link).await;

        assert_eq!(session, 1);
        assert_eq!(conn.session_index(), 1);
        assert_eq!(conn.state(), LinkState::Connected);
        assert_eq!(conn.error_count(), 0);
        assert_eq!(conn.reconnects(), 1);
        // 1 boot attempt + 6 failures + 1 success
        assert_eq!(link.init_attempts(), 8);
    }
}
