//! Network reachability with a bounded retry budget and a sticky offline mode.

use log::{debug, info, warn};
use pulse_lib::{Display, MonitorError};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    /// Retries were exhausted (or networking was disabled). Never left again.
    OfflineSticky,
}

/// Physical network association.
pub trait Link {
    /// Start associating. Completion is observed through [`Link::is_up`].
    fn associate(&mut self);
    fn is_up(&mut self) -> bool;
    /// Local address to show once connected.
    fn address(&self) -> Option<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

pub struct ConnectivityManager<L> {
    link: L,
    state: ConnectivityState,
    policy: RetryPolicy,
    polls: u32,
}

impl<L: Link> ConnectivityManager<L> {
    pub fn new(link: L, policy: RetryPolicy) -> Self {
        Self {
            link,
            state: ConnectivityState::Disconnected,
            policy,
            polls: 0,
        }
    }

    /// A manager that starts offline and never touches the link.
    pub fn disabled(link: L) -> Self {
        Self {
            link,
            state: ConnectivityState::OfflineSticky,
            policy: RetryPolicy::default(),
            polls: 0,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectivityState::Connected
    }

    pub fn is_offline(&self) -> bool {
        self.state == ConnectivityState::OfflineSticky
    }

    /// Total link polls performed over the manager's lifetime.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Make sure the link is up, running the bounded retry sequence if needed.
    ///
    /// Returns `ConnectivityFailure` only on the call that exhausts the retry
    /// budget; afterwards the manager stays offline and returns immediately.
    pub fn check(&mut self, display: &mut dyn Display) -> Result<ConnectivityState, MonitorError> {
        match self.state {
            ConnectivityState::OfflineSticky => return Ok(self.state),
            ConnectivityState::Connected => {
                if self.link.is_up() {
                    return Ok(self.state);
                }
                warn!("link dropped, reconnecting");
                self.state = ConnectivityState::Disconnected;
            }
            ConnectivityState::Disconnected | ConnectivityState::Connecting => {}
        }
        self.connect(display)
    }

    fn connect(&mut self, display: &mut dyn Display) -> Result<ConnectivityState, MonitorError> {
        self.state = ConnectivityState::Connecting;
        info!("connecting (up to {} attempts)", self.policy.attempts);
        self.link.associate();
        for attempt in 1..=self.policy.attempts {
            self.polls += 1;
            if self.link.is_up() {
                self.state = ConnectivityState::Connected;
                let address = self.link.address().unwrap_or_else(|| "unknown".into());
                info!("connected on attempt {} ({})", attempt, address);
                display.show_status(&format!("Connected\nIP: {}", address));
                return Ok(self.state);
            }
            debug!("attempt {} of {} failed", attempt, self.policy.attempts);
            display.show_status("Waiting for\nconnection...");
            if !self.policy.delay.is_zero() {
                std::thread::sleep(self.policy.delay);
            }
        }
        self.state = ConnectivityState::OfflineSticky;
        let err = MonitorError::ConnectivityFailure {
            attempts: self.policy.attempts,
        };
        warn!("{}; staying offline for this session", err);
        display.show_status("No connection\nContinuing in\noffline mode");
        Err(err)
    }
}

/// Treats the network as up when a TCP connection to `target` succeeds.
///
/// The remote probe only runs while associating. Once connected, the link
/// counts as up for as long as its local address is still assigned, so a
/// remote hiccup is not mistaken for a dropped link.
pub struct TcpProbeLink {
    target: String,
    timeout: Duration,
    local: Option<SocketAddr>,
}

impl TcpProbeLink {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
            local: None,
        }
    }

    fn still_assigned(&mut self, local: SocketAddr) -> bool {
        match UdpSocket::bind(SocketAddr::new(local.ip(), 0)) {
            Ok(_) => true,
            Err(err) => {
                debug!("local address {} gone: {}", local.ip(), err);
                self.local = None;
                false
            }
        }
    }

    fn probe(&mut self) -> bool {
        let addrs = match self.target.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                debug!("cannot resolve {}: {}", self.target, err);
                return false;
            }
        };
        for addr in addrs {
            if let Ok(stream) = TcpStream::connect_timeout(&addr, self.timeout) {
                self.local = stream.local_addr().ok();
                return true;
            }
        }
        false
    }
}

impl Link for TcpProbeLink {
    fn associate(&mut self) {
        self.local = None;
    }

    fn is_up(&mut self) -> bool {
        if let Some(local) = self.local {
            return self.still_assigned(local);
        }
        self.probe()
    }

    fn address(&self) -> Option<String> {
        self.local.map(|addr| addr.ip().to_string())
    }
}
