//! Live telemetry feed over TCP.
//!
//! Each accepted connection becomes a hub subscriber that receives one JSON
//! reading per line. Anything the client sends is read and discarded; EOF or
//! a read error unregisters the subscriber.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::hub::{BroadcastHub, DeliveryError, MessageSink};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to bind live feed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Newline-delimited writer used as a hub subscriber.
pub struct LineSink<W> {
    writer: W,
}

impl<W> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> MessageSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> Result<(), DeliveryError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "Error shutting down subscriber connection");
        }
    }
}

pub struct LiveFeed {
    listener: TcpListener,
    hub: BroadcastHub,
}

impl LiveFeed {
    pub async fn bind(addr: SocketAddr, hub: BroadcastHub) -> Result<Self, FeedError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| FeedError::Bind { addr, source })?;
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Live telemetry feed listening");
        }

        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Live telemetry feed shutting down");
                    break;
                }
                result = self.listener.accept() => result,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let hub = self.hub.clone();
                    tokio::spawn(handle_connection(stream, peer, hub));
                }
                Err(e) => error!(error = %e, "Failed to accept feed connection"),
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, hub: BroadcastHub) {
    let (reader, writer) = stream.into_split();
    let id = hub.register(LineSink::new(writer));
    info!(%peer, subscriber = %id, "Feed client connected");

    drain(reader).await;

    hub.unregister(id);
    info!(%peer, subscriber = %id, "Feed client disconnected");
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) {
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Feed client read error");
                break;
            }
        }
    }
}
