//! Gran Turismo 7 source: Salsa20-encrypted fixed-offset packets over UDP.

pub mod cipher;
pub mod decode;
pub mod layout;

use anyhow::Context;
use laplog_ingest_core::*;
use tokio::{net::UdpSocket, time};
use tracing::{debug, info, trace, warn};

pub use decode::decode;

/// Single-byte heartbeat requesting the standard 0x128-byte packet.
pub const HEARTBEAT: &[u8] = b"A";

#[derive(Clone, Debug)]
pub struct GT7Config {
    /// Local bind address for receiving packets from the console (default port 33740)
    pub bind_addr: String,
    /// Console IP address to send heartbeat packets to
    pub console_ip: String,
    /// Console port that listens for heartbeats
    pub heartbeat_port: u16,
    /// Heartbeat again after this many received datagrams
    pub heartbeat_every: u32,
    pub transport: TransportConfig,
}

impl Default for GT7Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:33740".into(),
            console_ip: "192.168.1.100".into(),
            heartbeat_port: 33739,
            heartbeat_every: 100,
            transport: TransportConfig::default(),
        }
    }
}

pub struct GT7Source { cfg: GT7Config }
impl GT7Source { pub fn new(cfg: GT7Config) -> Self { Self { cfg } } }

impl GT7Source {
    async fn heartbeat(&self, socket: &UdpSocket) {
        let target = (self.cfg.console_ip.as_str(), self.cfg.heartbeat_port);
        match socket.send_to(HEARTBEAT, target).await {
            Ok(_) => trace!("sent GT7 heartbeat"),
            Err(e) => warn!(error = %e, console = %self.cfg.console_ip, "GT7 heartbeat failed"),
        }
    }
}

#[async_trait::async_trait]
impl TelemetrySource for GT7Source {
    fn variant(&self) -> Variant {
        Variant::GT7
    }

    async fn run(&self, tx: TelemetryTx, stop: StopFlag, stats: IngestStats) -> Result<(), IngestError> {
        let socket = UdpSocket::bind(&self.cfg.bind_addr).await
            .with_context(|| format!("bind {}", self.cfg.bind_addr))?;
        info!(bind = %self.cfg.bind_addr, console = %self.cfg.console_ip, "GT7 source listening");
        self.heartbeat(&socket).await;

        let mut buf = vec![0u8; 4096];
        let mut since_heartbeat = 0u32;
        let mut errors = self.cfg.transport.error_budget();
        while !stop.is_stopped() {
            match time::timeout(self.cfg.transport.recv_timeout, socket.recv_from(&mut buf)).await {
                Err(_) => {
                    debug!("no GT7 packet before timeout, re-sending heartbeat");
                    self.heartbeat(&socket).await;
                    since_heartbeat = 0;
                }
                Ok(Err(e)) => {
                    let retry = errors.fail();
                    warn!(error = %e, attempt = errors.failures(), "GT7 receive failed");
                    if !retry {
                        return Err(IngestError::Transport(e));
                    }
                    self.heartbeat(&socket).await;
                    since_heartbeat = 0;
                }
                Ok(Ok((len, _peer))) => {
                    errors.succeed();
                    stats.record_received();
                    let result = decode(&buf[..len]);
                    stats.record_decode(&result);
                    match result {
                        Ok(sample) => {
                            if !forward(&tx, Ingest::Sample(sample), &stats) {
                                debug!("recorder hung up, stopping GT7 source");
                                break;
                            }
                        }
                        Err(e) => trace!(error = %e, len, "dropping GT7 datagram"),
                    }
                    since_heartbeat += 1;
                    if since_heartbeat >= self.cfg.heartbeat_every {
                        self.heartbeat(&socket).await;
                        since_heartbeat = 0;
                        debug!(counters = ?stats.snapshot(), "GT7 ingest");
                    }
                }
            }
        }
        info!(counters = ?stats.snapshot(), "GT7 source stopped");
        Ok(())
    }
}
