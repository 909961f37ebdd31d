//! UDP ingest.
//!
//! One receive at a time into a reusable buffer; every datagram is copied out
//! and handled on its own task so a slow insert or broadcast never holds up
//! the next receive. Frames handled concurrently are not ordered relative to
//! each other.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{RawFrame, MAX_FRAME_SIZE};
use crate::config::IngestConfig;
use crate::pipeline::TelemetryPipeline;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to bind ingest socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Receive error: {0}")]
    Receive(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub receive_errors: u64,
}

#[derive(Debug, Default)]
struct IngestCounters {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    receive_errors: AtomicU64,
}

impl IngestCounters {
    fn snapshot(&self) -> IngestStats {
        IngestStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of a listener's counters that outlives `run`.
#[derive(Debug, Clone)]
pub struct IngestStatsHandle(Arc<IngestCounters>);

impl IngestStatsHandle {
    pub fn get(&self) -> IngestStats {
        self.0.snapshot()
    }
}

pub struct IngestListener {
    socket: UdpSocket,
    pipeline: Arc<TelemetryPipeline>,
    in_flight: Option<Arc<Semaphore>>,
    counters: Arc<IngestCounters>,
}

impl IngestListener {
    /// Binds the ingest socket. Failure here is fatal for the service.
    pub async fn bind(config: &IngestConfig, pipeline: Arc<TelemetryPipeline>) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|source| IngestError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        let in_flight = (config.max_in_flight > 0).then(|| Arc::new(Semaphore::new(config.max_in_flight)));

        Ok(Self {
            socket,
            pipeline,
            in_flight,
            counters: Arc::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> IngestStatsHandle {
        IngestStatsHandle(Arc::clone(&self.counters))
    }

    /// Receives until `shutdown` is cancelled. Receive errors are logged and
    /// skipped. Frame tasks already spawned keep running after return.
    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.socket.local_addr() {
            info!(%addr, "UDP telemetry listener started");
        }

        let mut buffer = [0u8; MAX_FRAME_SIZE];

        loop {
            let received = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("UDP telemetry listener shutting down");
                    break;
                }
                result = self.socket.recv_from(&mut buffer) => result,
            };

            match received {
                Ok((len, peer)) => {
                    self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
                    if let Ok(frame) = RawFrame::from_slice(&buffer[..len]) {
                        self.dispatch(frame, peer);
                    } else {
                        warn!(%peer, len, "Datagram larger than frame buffer");
                    }
                }
                Err(e) => {
                    self.counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                    error!(error = %IngestError::Receive(e), "Error receiving UDP packet");
                }
            }
        }
    }

    fn dispatch(&self, frame: RawFrame, peer: SocketAddr) {
        let permit = if let Some(limit) = &self.in_flight {
            let Ok(permit) = Arc::clone(limit).try_acquire_owned() else {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, "Too many frames in flight, dropping frame");
                return;
            };
            Some(permit)
        } else {
            None
        };

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            match pipeline.handle_frame(&frame).await {
                Ok(reading) => debug!(
                    %peer,
                    timestamp = %reading.timestamp(),
                    anomaly = reading.is_anomaly(),
                    "Processed telemetry frame"
                ),
                Err(e) => warn!(%peer, len = frame.len(), error = %e, "Dropping telemetry frame"),
            }
            drop(permit);
        });
    }
}
