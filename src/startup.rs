//! Deferred engine launch: wait for the host main loop, then start once.
//!
//! The engine is typically loaded before the host application has finished
//! initializing, so a watcher thread polls the host's readiness hook. Once
//! ready it hands the capability bundle across a one-shot channel to the
//! engine thread, which builds a current-thread runtime and runs the
//! session loop there. Nothing else ever crosses that thread boundary.
//!
//! If the host never becomes ready within the startup window the engine is
//! simply not started; the only trace is a local log line, since no client
//! can have connected yet.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::config::{self, STARTUP_MAX_WAIT_MS, STARTUP_POLL_MS};
use crate::dispatch::Engine;
use crate::host::Host;
use crate::server::Server;

/// Spawn the readiness watcher and the engine thread.
///
/// Returns the engine thread's join handle (mostly useful in tests; a host
/// integration just drops it).
pub fn watch(host: Host) -> thread::JoinHandle<()> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Host>(1);

    let control = host.control.clone();
    thread::Builder::new()
        .name("stagehand-startup".into())
        .spawn(move || {
            let mut waited = 0;
            while !control.is_ready() {
                if waited >= STARTUP_MAX_WAIT_MS {
                    log::error!(
                        "[startup] host not ready after {STARTUP_MAX_WAIT_MS} ms, engine not started"
                    );
                    return;
                }
                thread::sleep(Duration::from_millis(STARTUP_POLL_MS));
                waited += STARTUP_POLL_MS;
            }

            log::info!("[startup] host ready, launching engine");
            let _ = ready_tx.send(host);
        })
        .expect("failed to spawn startup watcher thread");

    thread::Builder::new()
        .name("stagehand-engine".into())
        .spawn(move || {
            // Bounded wait: if the watcher gave up, so do we.
            let timeout = Duration::from_millis(STARTUP_MAX_WAIT_MS + STARTUP_POLL_MS);
            let host = match ready_rx.recv_timeout(timeout) {
                Ok(host) => host,
                Err(_) => return,
            };
            run_engine(host);
        })
        .expect("failed to spawn engine thread")
}

/// Build the single-threaded runtime and run the session server on it.
fn run_engine(host: Host) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("[startup] failed to build runtime: {e}");
            return;
        }
    };

    runtime.block_on(async {
        let server = match Server::bind(config::port()).await {
            Ok(server) => server,
            Err(e) => {
                log::error!("[startup] {e:#}");
                return;
            }
        };

        if let Err(e) = server.run(Engine::new(host)).await {
            log::error!("[startup] session loop failed: {e:#}");
        }
    });
}
