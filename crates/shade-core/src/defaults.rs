//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Cipher Defaults
// ============================================================================

/// Default cipher method for new nodes.
pub const DEFAULT_CIPHER: &str = "aead_chacha20_poly1305";

// ============================================================================
// Relay Defaults
// ============================================================================

/// Default relay buffer size (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;
/// Grace period for the slower relay direction after the first one
/// finishes, in seconds.
pub const DEFAULT_DRAIN_GRACE_SECS: u64 = 1;
/// How long a pending greeting header waits for payload to coalesce with
/// before it is flushed on its own, in milliseconds.
pub const HEADER_FLUSH_DELAY_MS: u64 = 5;

// ============================================================================
// TCP Socket Defaults
// ============================================================================

/// Default TCP_NODELAY (disable Nagle's algorithm for lower latency).
pub const DEFAULT_TCP_NO_DELAY: bool = true;
/// Default TCP Keep-Alive interval in seconds (0 = disabled).
pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 15;

// ============================================================================
// Listener Defaults
// ============================================================================

/// Default SOCKS5 listen address for client mode.
pub const DEFAULT_SOCKS_LISTEN: &str = "127.0.0.1:1080";

// ============================================================================
// Parked Connection Cache Defaults
// ============================================================================

/// How long an unclaimed parked connection is kept, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
/// Minimum interval between expiry sweeps of the parked connection
/// cache, in seconds.
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Reverse Cascade Defaults
// ============================================================================

/// Delay before re-dialing the server after the command channel drops,
/// in seconds.
pub const REVERSE_RECONNECT_DELAY_SECS: u64 = 1;

// ============================================================================
// Replay Guard Defaults
// ============================================================================

/// Whether replay detection is on unless configured otherwise.
pub const DEFAULT_REPLAY_ENABLED: bool = true;
/// Default number of bloom filter generations.
pub const DEFAULT_REPLAY_GENERATIONS: usize = 10;
/// Default total salt capacity across all generations.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_000_000;
/// Default bloom filter false positive rate.
pub const DEFAULT_REPLAY_FPR: f64 = 1e-6;

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default log format: "pretty", "compact", or "json".
pub const DEFAULT_LOG_FORMAT: &str = "pretty";
/// Default log output: "stderr" or "stdout".
pub const DEFAULT_LOG_OUTPUT: &str = "stderr";
