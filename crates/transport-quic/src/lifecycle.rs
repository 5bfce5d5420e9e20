use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a secure connection. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake and initial stream exchange in progress.
    Connecting = 0,
    /// Ready for stream traffic.
    Established = 1,
    /// Teardown started.
    Closing = 2,
    /// Terminal. A new connection must be created to retry.
    Closed = 3,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Established,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Established => "established",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Monotonic state cell.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) const fn new(initial: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `next` unless already there or further along. Returns
    /// whether the state changed.
    pub(crate) fn advance(&self, next: ConnectionState) -> bool {
        self.state.fetch_max(next as u8, Ordering::AcqRel) < next as u8
    }
}
