//! Shared test utilities for integration tests.
//!
//! This module provides common constants and helper functions that are used
//! across multiple test files to avoid duplication.

use std::net::SocketAddr;
use std::sync::Once;

// ============================================================================
// Tracing Setup
// ============================================================================

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing` subscriber that writes through the test harness's
/// captured output, so `--nocapture` shows the gate's debug events.
///
/// Safe to call from every test; only the first call installs anything.
#[allow(dead_code)]
pub fn init_test_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Network Test Utilities
// ============================================================================

/// Creates a test socket address with localhost IP and the given port.
#[allow(dead_code)]
#[must_use]
pub fn test_addr(port: u16) -> SocketAddr {
    use std::net::{IpAddr, Ipv4Addr};
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// Loopback with an OS-assigned port, for binding real sockets without
/// port conflicts between parallel tests.
#[allow(dead_code)]
#[must_use]
pub fn any_port_loopback() -> SocketAddr {
    test_addr(0)
}
