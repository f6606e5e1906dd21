//! Minimal STOMP 1.2 client-side protocol support.

pub mod frame;

use std::time::Duration;

pub use frame::{Command, Frame};

/// Protocol versions offered on CONNECT.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Heart-beat intervals as carried by the `heart-beat` header.
/// Zero means "none" in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Smallest interval at which the sender can emit heart-beats.
    pub outgoing: Duration,
    /// Desired interval at which the sender wants to receive heart-beats.
    pub incoming: Duration,
}

impl HeartBeat {
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    /// Parse `cx,cy`. Missing or malformed headers mean no heart-beating.
    pub fn parse(header: Option<&str>) -> Self {
        let Some((out, inc)) = header.and_then(|h| h.split_once(',')) else {
            return Self::default();
        };
        let ms = |s: &str| s.trim().parse::<u64>().map(Duration::from_millis).unwrap_or_default();
        Self::new(ms(out), ms(inc))
    }

    pub fn to_header(self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Negotiate the effective `(send_every, expect_within)` intervals for a
    /// client that offered `self` and a server that answered `server`.
    pub fn negotiate(self, server: HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: Duration, theirs: Duration| {
            (!ours.is_zero() && !theirs.is_zero()).then(|| ours.max(theirs))
        };
        (
            pick(self.outgoing, server.incoming),
            pick(self.incoming, server.outgoing),
        )
    }
}
