//! Assetto Corsa remote telemetry source: plaintext UDP updates after a handshake.

pub mod handshake;
pub mod update;

use std::time::Duration;

use anyhow::Context;
use laplog_ingest_core::*;
use tokio::{net::UdpSocket, time};
use tracing::{debug, info, trace, warn};

use handshake::{control_message, Operation, HANDSHAKE_SIZE};

pub use update::decode;

#[derive(Clone, Debug)]
pub struct ACConfig {
    pub server_addr: String,     // e.g. "127.0.0.1:9996"
    /// How long to wait for each handshake reply before asking again
    pub handshake_timeout: Duration,
    pub transport: TransportConfig,
}

impl Default for ACConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:9996".into(),
            handshake_timeout: Duration::from_secs(5),
            transport: TransportConfig::default(),
        }
    }
}

pub struct ACSource {
    cfg: ACConfig
}

impl ACSource {
    pub fn new(cfg: ACConfig) -> Self { Self { cfg } }

    async fn send(&self, socket: &UdpSocket, op: Operation) -> Result<(), IngestError> {
        socket.send(&control_message(op)).await?;
        trace!(?op, "sent control message");
        Ok(())
    }

    /// Ask for a handshake until the server answers or `stop` is raised.
    async fn handshake(&self, socket: &UdpSocket, stop: &StopFlag) -> Result<Option<SessionInfo>, IngestError> {
        let mut buf = vec![0u8; 1024];
        while !stop.is_stopped() {
            info!(server = %self.cfg.server_addr, "sending handshake");
            if let Err(e) = self.send(socket, Operation::Handshake).await {
                debug!(error = %e, "handshake send failed");
                time::sleep(self.cfg.handshake_timeout).await;
                continue;
            }
            match time::timeout(self.cfg.handshake_timeout, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => match handshake::parse(&buf[..len]) {
                    Ok(info) => return Ok(Some(info)),
                    Err(e) => debug!(error = %e, "ignoring non-handshake reply"),
                },
                // Nothing listening yet answers with ICMP unreachable on some platforms.
                Ok(Err(e)) => debug!(error = %e, "handshake receive failed"),
                Err(_) => debug!("no handshake reply yet"),
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ACSource {
    fn variant(&self) -> Variant {
        Variant::AC
    }

    async fn run(&self, tx: TelemetryTx, stop: StopFlag, stats: IngestStats) -> Result<(), IngestError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.context("bind AC client socket")?;
        socket.connect(&self.cfg.server_addr).await
            .with_context(|| format!("connect {}", self.cfg.server_addr))?;

        if let Err(e) = self.send(&socket, Operation::Dismiss).await {
            debug!(error = %e, "initial dismiss failed");
        }
        let Some(info) = self.handshake(&socket, &stop).await? else {
            return Ok(());
        };
        info!(car = %info.car, driver = %info.driver, track = %info.track, config = %info.track_config, "connected");
        forward(&tx, Ingest::Session(info), &stats);
        self.send(&socket, Operation::SubscribeUpdate).await?;

        let mut buf = vec![0u8; 2048];
        let mut tick = 0u64;
        let mut errors = self.cfg.transport.error_budget();
        while !stop.is_stopped() {
            let len = match time::timeout(self.cfg.transport.recv_timeout, socket.recv(&mut buf)).await {
                Err(_) => {
                    debug!("no AC update before timeout");
                    continue;
                }
                Ok(Err(e)) => {
                    let retry = errors.fail();
                    warn!(error = %e, attempt = errors.failures(), "AC receive failed");
                    if !retry {
                        return Err(IngestError::Transport(e));
                    }
                    continue;
                }
                Ok(Ok(len)) => len,
            };
            errors.succeed();
            stats.record_received();

            if len == HANDSHAKE_SIZE {
                if let Ok(info) = handshake::parse(&buf[..len]) {
                    forward(&tx, Ingest::Session(info), &stats);
                    continue;
                }
            }

            let result = decode(&buf[..len], tick);
            stats.record_decode(&result);
            match result {
                Ok(sample) => {
                    tick += 1;
                    if !forward(&tx, Ingest::Sample(sample), &stats) {
                        debug!("recorder hung up, stopping AC source");
                        break;
                    }
                }
                Err(e) => trace!(error = %e, len, "dropping AC datagram"),
            }
        }

        if let Err(e) = self.send(&socket, Operation::Dismiss).await {
            warn!(error = %e, "failed to dismiss AC session");
        }
        info!(counters = ?stats.snapshot(), "AC source stopped");
        Ok(())
    }
}
