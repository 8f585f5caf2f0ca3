//! Stagehand - remote introspection and control engine for GUI testing.
//!
//! Loaded into a running graphical application, the engine lets a remote
//! client enumerate the live object tree, read and write object properties,
//! record and replay user input, and capture the screen — everything a GUI
//! test driver needs, over one TCP connection.
//!
//! # Architecture
//!
//! ```text
//! Client Process                     Host Process (application under test)
//! ┌──────────────┐   SLIP packets   ┌───────────────────────────────────┐
//! │ test driver  │◄────────────────►│ Server ─ Engine ─┬─ ObjectRegistry│
//! └──────────────┘   over TCP       │                  ├─ EventRecorder │
//!                                   │   host traits ───┴─ Property      │
//!                                   │   (graph, input, screen, values)  │
//!                                   └───────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`slip`] - packet framing over the byte stream
//! - [`protocol`] - binary request/response messages
//! - [`host`] - capability traits the host integration implements
//! - [`registry`] - rebuildable id→object index
//! - [`properties`] - property access bridge and default value codec
//! - [`recorder`] - input recording state machine and replay
//! - [`dispatch`] - request routing
//! - [`server`] - TCP session loop
//! - [`startup`] - deferred one-shot engine launch
//!
//! A host integration implements the [`host`] traits and calls [`install`]
//! once at load time.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod config;
pub mod dispatch;
pub mod host;
pub mod properties;
pub mod protocol;
pub mod recorder;
pub mod registry;
pub mod server;
pub mod slip;
pub mod startup;

// Re-export the types an integration or client needs.
pub use dispatch::{Engine, Outcome};
pub use host::{Host, HostControl, HostObject, InputDriver, InputSample, ObjectGraph,
    ScreenCapture, ValueCodec};
pub use properties::JsonValueCodec;
pub use protocol::{ErrorCode, ObjectEntry, Property, Request, Response, UserEvent};
pub use recorder::EventRecorder;
pub use registry::{Lookup, ObjectRegistry};
pub use server::Server;

/// Process-wide guard against installing the engine twice.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the engine into the current process.
///
/// Spawns the startup watcher, which launches the session server once the
/// host's main loop is ready. Installation happens at most once per
/// process: repeat calls (and processes where [`config::LOADED_ENV`] is
/// already set, e.g. the library got loaded twice) do nothing.
///
/// Returns `true` if this call actually installed the engine.
pub fn install(host: Host) -> bool {
    if std::env::var_os(config::LOADED_ENV).is_some() {
        log::warn!("[stagehand] an instance was previously loaded, doing nothing");
        return false;
    }
    if INSTALLED.swap(true, Ordering::SeqCst) {
        log::warn!("[stagehand] already installed in this process, doing nothing");
        return false;
    }

    std::env::set_var(config::LOADED_ENV, "true");
    log::info!("[stagehand] installed, waiting for host startup");
    startup::watch(host);
    true
}
