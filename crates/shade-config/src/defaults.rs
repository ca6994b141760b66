//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `shade_core::defaults`.

use shade_core::defaults;

/// Generate default value functions that forward to shade_core::defaults constants.
macro_rules! default_fns {
    // For Copy types (integers, bool, etc.)
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

/// Generate default value functions that return String from &str constants.
macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                defaults::$const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_cache_ttl_secs     => DEFAULT_CACHE_TTL_SECS: u64,
    // TCP socket options
    default_tcp_no_delay       => DEFAULT_TCP_NO_DELAY: bool,
    default_tcp_keepalive_secs => DEFAULT_TCP_KEEPALIVE_SECS: u64,
    // Replay guard sizing
    default_replay_enabled     => DEFAULT_REPLAY_ENABLED: bool,
    default_replay_generations => DEFAULT_REPLAY_GENERATIONS: usize,
    default_replay_capacity    => DEFAULT_REPLAY_CAPACITY: usize,
    default_replay_fpr         => DEFAULT_REPLAY_FPR: f64,
}

default_string_fns! {
    default_cipher       => DEFAULT_CIPHER,
    default_socks_listen => DEFAULT_SOCKS_LISTEN,
}
