//! Session backend collaborator interfaces
//!
//! The backend owns actual network hosting and peer connections. The
//! coordinator only calls into it and receives its notifications through the
//! `SessionEvents` handlers.

use crate::error::ConnectionError;
use crate::types::{HostRecord, PeerId};
use std::sync::Mutex;

/// Trait for the network backend that hosts and joins sessions
pub trait SessionBackend: Send + Sync {
    /// Start hosting with `remote_slots` remote peers on `port`
    fn initialize_host(
        &self,
        remote_slots: usize,
        port: u16,
        use_relay: bool,
    ) -> Result<(), ConnectionError>;

    /// Start connecting to an advertised host; completion is notified later
    fn connect(&self, host: &HostRecord);

    /// Whether this machine is directly reachable (no relay needed)
    fn has_public_address(&self) -> bool;
}

/// Notification handlers the backend invokes
pub trait SessionEvents: Send + Sync {
    fn on_peer_connected(&self, peer: PeerId);

    fn on_peer_disconnected(&self, peer: PeerId);

    fn on_host_initialized(&self);

    fn on_connected_to_host(&self);
}

/// A recorded `initialize_host` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInitCall {
    pub remote_slots: usize,
    pub port: u16,
    pub use_relay: bool,
}

/// Backend that records calls and fails hosting on demand
#[derive(Debug)]
pub struct RecordingBackend {
    host_result: Mutex<Result<(), ConnectionError>>,
    public_address: bool,
    init_calls: Mutex<Vec<HostInitCall>>,
    connects: Mutex<Vec<HostRecord>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Backend whose hosting always succeeds
    pub fn new() -> Self {
        Self {
            host_result: Mutex::new(Ok(())),
            public_address: true,
            init_calls: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose hosting always fails with `error`
    pub fn failing(error: ConnectionError) -> Self {
        let backend = Self::new();
        backend.set_host_result(Err(error));
        backend
    }

    /// Backend that reports no public address
    pub fn behind_nat() -> Self {
        Self {
            public_address: false,
            ..Self::new()
        }
    }

    pub fn set_host_result(&self, result: Result<(), ConnectionError>) {
        if let Ok(mut slot) = self.host_result.lock() {
            *slot = result;
        }
    }

    pub fn init_calls(&self) -> Vec<HostInitCall> {
        self.init_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn connects(&self) -> Vec<HostRecord> {
        self.connects
            .lock()
            .map(|connects| connects.clone())
            .unwrap_or_default()
    }
}

impl SessionBackend for RecordingBackend {
    fn initialize_host(
        &self,
        remote_slots: usize,
        port: u16,
        use_relay: bool,
    ) -> Result<(), ConnectionError> {
        if let Ok(mut calls) = self.init_calls.lock() {
            calls.push(HostInitCall {
                remote_slots,
                port,
                use_relay,
            });
        }

        self.host_result
            .lock()
            .map(|result| result.clone())
            .unwrap_or_else(|_| {
                Err(ConnectionError::Refused {
                    reason: "backend state poisoned".to_string(),
                })
            })
    }

    fn connect(&self, host: &HostRecord) {
        if let Ok(mut connects) = self.connects.lock() {
            connects.push(host.clone());
        }
    }

    fn has_public_address(&self) -> bool {
        self.public_address
    }
}
