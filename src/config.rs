//! Engine settings taken from the host process environment.
//!
//! The engine is loaded into someone else's process, so there is no config
//! file and no CLI: everything is either a compile-time constant or an
//! environment variable set by whoever launched the host application.

/// Default TCP port the session server listens on.
pub const DEFAULT_PORT: u16 = 4242;

/// Environment variable that overrides the listening port.
pub const PORT_ENV: &str = "STAGEHAND_PORT";

/// Environment variable set once the engine has been installed.
///
/// Prevents a second copy of the library loaded into the same process from
/// starting a second engine.
pub const LOADED_ENV: &str = "STAGEHAND_LOADED";

/// Input sampling period while recording, in milliseconds (100 Hz).
pub const SAMPLE_INTERVAL_MS: u64 = 10;

/// Interval between host-readiness checks during startup, in milliseconds.
pub const STARTUP_POLL_MS: u64 = 1000;

/// Maximum time to wait for the host main loop before giving up.
pub const STARTUP_MAX_WAIT_MS: u64 = 5000;

/// Resolve the listening port from [`PORT_ENV`], falling back to
/// [`DEFAULT_PORT`] when unset or unparsable.
pub fn port() -> u16 {
    match std::env::var(PORT_ENV) {
        Ok(raw) => match raw.trim().parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                log::warn!(
                    "[stagehand] ignoring unparsable {PORT_ENV}={raw:?}, using {DEFAULT_PORT}"
                );
                DEFAULT_PORT
            }
        },
        Err(_) => DEFAULT_PORT,
    }
}
