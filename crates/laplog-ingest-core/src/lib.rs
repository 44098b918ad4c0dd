//! Core telemetry decoding primitives and traits shared by the laplog sources

pub mod schema;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

pub use model::{SessionInfo, Sample, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Salsa20-encrypted fixed-offset packets (Gran Turismo 7).
    GT7,
    /// Plaintext fixed struct with handshake (Assetto Corsa remote telemetry).
    AC,
}

impl Variant {
    pub fn name(self) -> &'static str {
        match self {
            Variant::GT7 => "gt7",
            Variant::AC => "ac",
        }
    }
}

/// Why a single datagram was not turned into a [`Sample`]. Never fatal:
/// callers drop the datagram and keep receiving.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("packet truncated: layout needs {needed} bytes, got {len}")]
    Truncated { needed: usize, len: usize },
    #[error("decryption failed: magic 0x{found:08X}")]
    DecryptionFailed { found: u32 },
    #[error("field {0} not present in layout")]
    MissingField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Items a source hands to the consumer side.
#[derive(Debug, Clone)]
pub enum Ingest {
    Session(SessionInfo),
    Sample(Sample),
}

pub type TelemetryTx = crossbeam_channel::Sender<Ingest>;
pub type TelemetryRx = crossbeam_channel::Receiver<Ingest>;

/// Bounded single-producer/single-consumer queue between transport and recorder.
pub fn channel(capacity: usize) -> (TelemetryTx, TelemetryRx) {
    crossbeam_channel::bounded(capacity.max(1))
}

/// Cooperative shutdown signal shared by the source task and the recorder thread.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounters {
    pub received: u64,
    pub decoded: u64,
    pub truncated: u64,
    pub decrypt_failed: u64,
    pub queue_full: u64,
}

/// Running counters for one source, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct IngestStats(Arc<Mutex<IngestCounters>>);

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IngestCounters {
        *self.0.lock()
    }

    pub fn record_received(&self) {
        self.0.lock().received += 1;
    }

    pub fn record_decode(&self, result: &Result<Sample, DecodeError>) {
        let mut c = self.0.lock();
        match result {
            Ok(_) => c.decoded += 1,
            Err(DecodeError::Truncated { .. }) | Err(DecodeError::MissingField(_)) => c.truncated += 1,
            Err(DecodeError::DecryptionFailed { .. }) => c.decrypt_failed += 1,
        }
    }

    pub fn record_queue_full(&self) {
        self.0.lock().queue_full += 1;
    }
}

/// Push without blocking the socket side; a full queue drops the item.
/// Returns `false` once the consumer has gone away.
pub fn forward(tx: &TelemetryTx, item: Ingest, stats: &IngestStats) -> bool {
    match tx.try_send(item) {
        Ok(()) => true,
        Err(crossbeam_channel::TrySendError::Full(_)) => {
            stats.record_queue_full();
            tracing::trace!("telemetry queue full, dropping item");
            true
        }
        Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
    }
}

/// Settings every UDP source shares.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// How long a receive may block before heartbeats and the stop flag are serviced.
    pub recv_timeout: Duration,
    /// Consecutive socket errors tolerated before the source gives up.
    pub max_consecutive_errors: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(2),
            max_consecutive_errors: 5,
        }
    }
}

impl TransportConfig {
    pub fn error_budget(&self) -> ErrorBudget {
        ErrorBudget { max: self.max_consecutive_errors, failures: 0 }
    }
}

/// Consecutive transport failures, reset by any successful receive.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    max: u32,
    failures: u32,
}

impl ErrorBudget {
    /// Count one failure. `false` once `max` failures happened in a row.
    pub fn fail(&mut self) -> bool {
        self.failures += 1;
        self.failures < self.max
    }

    pub fn succeed(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Trait for any live source connector
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    fn variant(&self) -> Variant;

    /// Receive until `stop` is raised, the consumer hangs up, or the transport fails.
    async fn run(&self, tx: TelemetryTx, stop: StopFlag, stats: IngestStats) -> Result<(), IngestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_drops_when_full() {
        let (tx, rx) = channel(1);
        let stats = IngestStats::new();
        assert!(forward(&tx, Ingest::Sample(Sample::default()), &stats));
        assert!(forward(&tx, Ingest::Sample(Sample::default()), &stats));
        assert_eq!(stats.snapshot().queue_full, 1);
        assert_eq!(rx.len(), 1);
        drop(rx);
        assert!(!forward(&tx, Ingest::Sample(Sample::default()), &stats));
    }

    #[test]
    fn decode_outcomes_are_counted() {
        let stats = IngestStats::new();
        stats.record_decode(&Ok(Sample::default()));
        stats.record_decode(&Err(DecodeError::Truncated { needed: 10, len: 3 }));
        stats.record_decode(&Err(DecodeError::DecryptionFailed { found: 0 }));
        stats.record_decode(&Err(DecodeError::DecryptionFailed { found: 1 }));
        let c = stats.snapshot();
        assert_eq!((c.decoded, c.truncated, c.decrypt_failed), (1, 1, 2));
    }

    #[test]
    fn error_budget_gives_up_after_consecutive_failures() {
        let cfg = TransportConfig { max_consecutive_errors: 3, ..Default::default() };
        let mut budget = cfg.error_budget();
        assert!(budget.fail());
        assert!(budget.fail());
        budget.succeed();
        assert_eq!(budget.failures(), 0);
        assert!(budget.fail());
        assert!(budget.fail());
        assert!(!budget.fail());
        assert_eq!(budget.failures(), 3);
    }

    #[test]
    fn stop_flag_is_shared() {
        let a = StopFlag::new();
        let b = a.clone();
        assert!(!b.is_stopped());
        a.stop();
        assert!(b.is_stopped());
    }
}
