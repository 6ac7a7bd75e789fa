//! Application-wide constants for salamander-bridge.
//!
//! Constants are grouped by domain so the tuning knobs for the transports
//! and the storage layout live in one place.
//!
//! # Categories
//!
//! - **Timeouts**: network and handshake timeouts
//! - **Reconnection**: live transport backoff
//! - **Storage**: persisted key names and file names

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for GraphQL request/response calls.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for opening a live session: TCP connect, WebSocket upgrade,
/// `connection_init` and the server's `connection_ack` together.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Reconnection
// ============================================================================

/// Initial reconnection delay for the live transport.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum reconnection delay for the live transport.
///
/// The delay doubles after every failed attempt up to this ceiling and
/// resets once a connection is acknowledged.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ============================================================================
// Storage
// ============================================================================

/// Key under which the client identifier lives in client-local storage.
pub const CLIENT_ID_KEY: &str = "clientId";

/// File name of the client-local key/value store.
pub const LOCAL_STORAGE_FILE: &str = "local_storage.json";

/// File name of the optional configuration file.
pub const CONFIG_FILE: &str = "config.json";

/// Directory name used under the platform config directory.
pub const APP_DIR_NAME: &str = "salamander";
