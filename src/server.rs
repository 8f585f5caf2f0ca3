//! TCP session loop: accept, reassemble, dispatch, reply.
//!
//! One cooperative loop drives everything: waiting for a connection,
//! reading request bytes, and the recorder's sampling ticks all share a
//! single task via `select!`, so request handling and input sampling never
//! run concurrently and the engine needs no locking. Connections are
//! serviced one at a time; a second client may connect but sits in the
//! accept backlog until the first one goes away.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::SAMPLE_INTERVAL_MS;
use crate::dispatch::{Engine, Outcome};
use crate::slip::{self, SlipReassembler};

/// How a single client session ended.
enum SessionEnd {
    /// The client went away; keep accepting.
    Disconnected,
    /// The client asked for host termination; stop serving.
    Terminate,
}

/// The engine's TCP server.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind the listener on all interfaces at `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind TCP port {port}"))?;
        log::info!("[server] listening on port {}", listener.local_addr()?.port());
        Ok(Self { listener })
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients until a TERMINATE_HOST request arrives.
    ///
    /// On termination the pending response is flushed first, then the
    /// host's quit hook is invoked and this future resolves.
    pub async fn run(self, mut engine: Engine) -> Result<()> {
        let mut ticker = tokio::time::interval(Duration::from_millis(SAMPLE_INTERVAL_MS));
        // Ticks are disabled while idle; don't replay the backlog when a
        // recording starts.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            log::info!("[server] client connected: {addr}");
                            match Self::serve(&mut engine, stream, &mut ticker).await {
                                Ok(SessionEnd::Disconnected) => {}
                                Ok(SessionEnd::Terminate) => {
                                    log::info!("[server] termination requested, shutting down");
                                    engine.host().control.request_quit();
                                    return Ok(());
                                }
                                Err(e) => log::warn!("[server] session error: {e}"),
                            }
                        }
                        Err(e) => {
                            log::error!("[server] accept error: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = ticker.tick(), if engine.is_recording() => engine.tick(),
            }
        }
    }

    /// Service one connection until it closes or requests termination.
    async fn serve(
        engine: &mut Engine,
        mut stream: TcpStream,
        ticker: &mut Interval,
    ) -> Result<SessionEnd> {
        let mut slip = SlipReassembler::new();
        let mut buf = [0u8; 64 * 1024];

        loop {
            tokio::select! {
                read = stream.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => {
                            log::info!("[server] client disconnected");
                            return Ok(SessionEnd::Disconnected);
                        }
                        Ok(n) => n,
                        Err(e) => {
                            log::warn!("[server] read error: {e}");
                            return Ok(SessionEnd::Disconnected);
                        }
                    };

                    slip.feed(&buf[..n]);

                    // One response per request, in request order.
                    while let Some(packet) = slip.next_packet() {
                        let (response, outcome) = engine.handle(&packet);
                        stream
                            .write_all(&slip::encode(&response.encode()))
                            .await
                            .context("failed to write response")?;

                        if outcome == Outcome::TerminateHost {
                            // Guarantee delivery before the host goes down.
                            stream.flush().await.context("failed to flush response")?;
                            return Ok(SessionEnd::Terminate);
                        }
                    }
                }
                _ = ticker.tick(), if engine.is_recording() => engine.tick(),
            }
        }
    }
}
