mod session;

use std::{path::PathBuf, thread};

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use laplog_ingest_ac::{ACConfig, ACSource};
use laplog_ingest_core::{channel, IngestStats, StopFlag, TelemetrySource};
use laplog_ingest_gt7::{GT7Config, GT7Source};
use laplog_io::{FileSink, SinkConfig};
use segment::{Recorder, SegmenterConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "laplog", version, about = "Record simulator telemetry into per-lap log files")]
struct Cli {
    #[command(subcommand)]
    source: Source,
    #[command(flatten)]
    opts: RecordOpts,
}

#[derive(Subcommand, Debug)]
enum Source {
    /// Gran Turismo 7 on a console in the local network
    Gt7 {
        /// Console address heartbeats are sent to
        console_ip: String,
        /// Local port the console streams to
        #[arg(long, default_value_t = 33740)]
        port: u16,
    },
    /// Assetto Corsa remote telemetry server
    Ac {
        #[arg(default_value = "127.0.0.1")]
        host: String,
        #[arg(default_value_t = 9996)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
struct RecordOpts {
    /// Directory session folders are created in
    #[arg(long, global = true, default_value = "log")]
    out: PathBuf,
    /// Distance travelled between logged rows
    #[arg(long, global = true, default_value_t = 1.0)]
    distance_interval: f64,
    /// Lap clock rollback (seconds) treated as a new lap
    #[arg(long, global = true, default_value_t = 0.5)]
    boundary_tolerance: f64,
    /// Lap index drop treated as a session restart
    #[arg(long, global = true, default_value_t = 2)]
    restart_threshold: i32,
    #[arg(long, global = true, default_value_t = 1024)]
    queue_capacity: usize,
}

impl RecordOpts {
    fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            distance_interval: self.distance_interval,
            boundary_tolerance_s: self.boundary_tolerance,
            restart_threshold: self.restart_threshold,
        }
    }
}

async fn record<S: TelemetrySource + 'static>(source: S, opts: RecordOpts) -> anyhow::Result<()> {
    let (tx, rx) = channel(opts.queue_capacity.max(1));
    let stop = StopFlag::new();
    let stats = IngestStats::new();
    let sink = FileSink::new(SinkConfig { out_dir: opts.out.clone(), variant: source.variant().name().into() });
    let seg_cfg = opts.segmenter();

    let consumer = {
        let stop = stop.clone();
        thread::Builder::new()
            .name("laplog-recorder".into())
            .spawn(move || {
                let mut recorder = Recorder::new(seg_cfg, sink);
                let samples = session::pump(&rx, &stop, &mut recorder);
                if let Err(e) = recorder.finish() {
                    error!(error = %e, "failed to close the last lap");
                }
                samples
            })
            .context("spawn recorder thread")?
    };

    let mut producer = {
        let stop = stop.clone();
        let stats = stats.clone();
        tokio::spawn(async move { source.run(tx, stop, stats).await })
    };

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for ctrl-c")?;
            info!("interrupted, shutting down");
            None
        }
        res = &mut producer => Some(res),
    };
    stop.stop();
    let outcome = match finished {
        Some(res) => res,
        None => producer.await,
    };

    let samples = consumer.join().map_err(|_| anyhow!("recorder thread panicked"))?;
    info!(samples, counters = ?stats.snapshot(), "recorder stopped");
    outcome.context("telemetry source task")?.context("telemetry source")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!(out = %cli.opts.out.display(), "laplog starting");
    match cli.source {
        Source::Gt7 { console_ip, port } => {
            let cfg = GT7Config { bind_addr: format!("0.0.0.0:{port}"), console_ip, ..Default::default() };
            record(GT7Source::new(cfg), cli.opts).await
        }
        Source::Ac { host, port } => {
            let cfg = ACConfig { server_addr: format!("{host}:{port}"), ..Default::default() };
            record(ACSource::new(cfg), cli.opts).await
        }
    }
}
