//! Lap segmentation: turns a stream of samples into per-lap log segments.
//!
//! [`Segmenter::step`] is a total function over `(state, sample)`; it only
//! produces [`SegmentEvent`]s. Applying those to storage is the job of a
//! [`LogSink`], driven by [`Recorder`].

mod recorder;
mod sink;

pub use recorder::Recorder;
pub use sink::{LogSink, SinkError};

use model::Sample;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Log one row per this much travelled distance.
    pub distance_interval: f64,
    /// A lap clock falling back by more than this (seconds) starts a new lap.
    pub boundary_tolerance_s: f64,
    /// A lap index falling by more than this is a session restart.
    pub restart_threshold: i32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self { distance_interval: 1.0, boundary_tolerance_s: 0.5, restart_threshold: 2 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// The previous session was abandoned; later segments belong to a new one.
    SessionRestarted { from_lap: i32, to_lap: i32 },
    SegmentOpened { lap: i32 },
    Row { lap: i32, lap_time_s: f64, sample: Sample },
    /// `completed` is false when the lap was cut short by a restart or shutdown.
    SegmentClosed { lap: i32, duration_s: f64, completed: bool },
}

#[derive(Debug, Clone)]
struct SegmentState {
    current_lap: i32,
    reference_lap_clock: f64,
    segment_started_at: f64,
    accumulated_distance: f64,
    last_sample: Sample,
}

impl SegmentState {
    fn elapsed(&self) -> f64 {
        (self.last_sample.lap_clock_s - self.segment_started_at).max(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    cfg: SegmenterConfig,
    state: Option<SegmentState>,
}

impl Segmenter {
    pub fn new(cfg: SegmenterConfig) -> Self {
        Self { cfg, state: None }
    }

    /// Lap of the open segment, `None` before the first sample.
    pub fn current_lap(&self) -> Option<i32> {
        self.state.as_ref().map(|s| s.current_lap)
    }

    pub fn accumulated_distance(&self) -> f64 {
        self.state.as_ref().map_or(0.0, |s| s.accumulated_distance)
    }

    pub fn step(&mut self, sample: Sample) -> Vec<SegmentEvent> {
        let mut events = Vec::with_capacity(3);
        let next = match self.state.take() {
            None => open(sample, &mut events),
            Some(st) if self.is_boundary(&st, &sample) => {
                let from = st.current_lap;
                if from as i64 > sample.lap as i64 + self.cfg.restart_threshold as i64 {
                    info!(from_lap = from, to_lap = sample.lap, "lap index fell back, restarting session");
                    events.push(SegmentEvent::SegmentClosed { lap: from, duration_s: st.elapsed(), completed: false });
                    events.push(SegmentEvent::SessionRestarted { from_lap: from, to_lap: sample.lap });
                } else {
                    let duration_s = lap_duration(&st, &sample);
                    debug!(lap = from, duration_s, "lap boundary");
                    events.push(SegmentEvent::SegmentClosed { lap: from, duration_s, completed: true });
                }
                open(sample, &mut events)
            }
            Some(st) => self.advance(st, sample, &mut events),
        };
        self.state = Some(next);
        events
    }

    /// Close whatever is open. Nothing happens when no segment is open.
    pub fn finish(&mut self) -> Vec<SegmentEvent> {
        match self.state.take() {
            Some(st) => vec![SegmentEvent::SegmentClosed {
                lap: st.current_lap,
                duration_s: st.elapsed(),
                completed: false,
            }],
            None => Vec::new(),
        }
    }

    fn is_boundary(&self, st: &SegmentState, sample: &Sample) -> bool {
        sample.lap != st.current_lap
            || st.reference_lap_clock > sample.lap_clock_s + self.cfg.boundary_tolerance_s
    }

    fn advance(&self, mut st: SegmentState, sample: Sample, events: &mut Vec<SegmentEvent>) -> SegmentState {
        let mut delta = st.last_sample.position.distance(&sample.position);
        if !delta.is_finite() {
            delta = 0.0;
        }
        let before = st.accumulated_distance;
        let after = before + delta;
        let interval = self.cfg.distance_interval;
        let crossed = if interval > 0.0 {
            (before / interval).floor() != (after / interval).floor()
        } else {
            delta > 0.0
        };
        if crossed {
            events.push(SegmentEvent::Row {
                lap: st.current_lap,
                lap_time_s: sample.lap_clock_s - st.segment_started_at,
                sample: sample.clone(),
            });
        }
        st.accumulated_distance = after;
        st.reference_lap_clock = sample.lap_clock_s;
        st.last_sample = sample;
        st
    }
}

fn open(sample: Sample, events: &mut Vec<SegmentEvent>) -> SegmentState {
    let lap = sample.lap;
    events.push(SegmentEvent::SegmentOpened { lap });
    events.push(SegmentEvent::Row { lap, lap_time_s: 0.0, sample: sample.clone() });
    SegmentState {
        current_lap: lap,
        reference_lap_clock: sample.lap_clock_s,
        segment_started_at: sample.lap_clock_s,
        accumulated_distance: 0.0,
        last_sample: sample,
    }
}

/// Simulator-reported last lap when the index moved forward, else measured.
fn lap_duration(st: &SegmentState, boundary: &Sample) -> f64 {
    match boundary.last_lap_s {
        Some(t) if t > 0.0 && boundary.lap > st.current_lap => t,
        _ => st.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Vec3;
    use proptest::prelude::*;

    fn sample(lap: i32, clock: f64, x: f64) -> Sample {
        Sample { lap, lap_clock_s: clock, position: Vec3::new(x, 0.0, 0.0), ..Default::default() }
    }

    fn kinds(events: &[SegmentEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                SegmentEvent::SessionRestarted { from_lap, to_lap } => format!("restart({from_lap}->{to_lap})"),
                SegmentEvent::SegmentOpened { lap } => format!("open({lap})"),
                SegmentEvent::Row { lap, .. } => format!("row({lap})"),
                SegmentEvent::SegmentClosed { lap, completed, .. } => format!("close({lap},{completed})"),
            })
            .collect()
    }

    fn run(seg: &mut Segmenter, samples: Vec<Sample>) -> Vec<SegmentEvent> {
        samples.into_iter().flat_map(|s| seg.step(s)).collect()
    }

    #[test]
    fn lap_boundaries_open_and_close_in_order() {
        let mut seg = Segmenter::default();
        let events = run(&mut seg, vec![
            sample(0, 0.0, 0.0),
            sample(0, 0.1, 1.5),
            sample(0, 0.2, 3.0),
            sample(1, 0.0, 4.5),
            sample(1, 0.1, 6.0),
            sample(2, 0.0, 7.5),
        ]);
        assert_eq!(kinds(&events), vec![
            "open(0)", "row(0)", "row(0)", "row(0)",
            "close(0,true)", "open(1)", "row(1)", "row(1)",
            "close(1,true)", "open(2)", "row(2)",
        ]);
        assert_eq!(seg.current_lap(), Some(2));
    }

    #[test]
    fn large_lap_drop_restarts_session() {
        let mut seg = Segmenter::default();
        seg.step(sample(20, 10.0, 0.0));
        let events = seg.step(sample(0, 0.0, 1.0));
        assert_eq!(kinds(&events), vec!["close(20,false)", "restart(20->0)", "open(0)", "row(0)"]);
    }

    #[test]
    fn small_lap_drop_is_an_ordinary_boundary() {
        let mut seg = Segmenter::default();
        seg.step(sample(5, 10.0, 0.0));
        let events = seg.step(sample(3, 0.0, 1.0));
        assert_eq!(kinds(&events), vec!["close(5,true)", "open(3)", "row(3)"]);
    }

    #[test]
    fn clock_rollback_with_stale_index_is_a_boundary() {
        let mut seg = Segmenter::default();
        seg.step(sample(1, 88.0, 0.0));
        seg.step(sample(1, 90.0, 2.0));
        let events = seg.step(sample(1, 0.05, 3.0));
        assert_eq!(kinds(&events), vec!["close(1,true)", "open(1)", "row(1)"]);
        match &events[0] {
            SegmentEvent::SegmentClosed { duration_s, .. } => assert!((duration_s - 2.0).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clock_jitter_within_tolerance_is_ignored() {
        let mut seg = Segmenter::default();
        seg.step(sample(1, 10.0, 0.0));
        let events = seg.step(sample(1, 9.8, 0.2));
        assert!(events.is_empty());
    }

    #[test]
    fn duplicate_sample_is_not_logged_twice() {
        let mut seg = Segmenter::default();
        seg.step(sample(0, 0.0, 0.0));
        assert_eq!(kinds(&seg.step(sample(0, 0.1, 2.5))), vec!["row(0)"]);
        let before = seg.accumulated_distance();
        assert!(seg.step(sample(0, 0.1, 2.5)).is_empty());
        assert_eq!(seg.accumulated_distance(), before);
    }

    #[test]
    fn sub_interval_moves_accumulate() {
        let mut seg = Segmenter::default();
        seg.step(sample(0, 0.0, 0.0));
        let rows: Vec<_> = (1..=10).map(|i| seg.step(sample(0, i as f64, i as f64 * 0.25)).len()).collect();
        assert_eq!(rows, vec![0, 0, 0, 1, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn reported_last_lap_wins_over_measured() {
        let mut seg = Segmenter::default();
        seg.step(sample(1, 0.0, 0.0));
        seg.step(sample(1, 30.0, 5.0));
        let mut next = sample(2, 0.0, 6.0);
        next.last_lap_s = Some(31.25);
        let events = seg.step(next);
        assert_eq!(events[0], SegmentEvent::SegmentClosed { lap: 1, duration_s: 31.25, completed: true });
    }

    #[test]
    fn finish_closes_open_segment_once() {
        let mut seg = Segmenter::default();
        assert!(seg.finish().is_empty());
        seg.step(sample(4, 1.0, 0.0));
        seg.step(sample(4, 3.5, 9.0));
        assert_eq!(seg.finish(), vec![SegmentEvent::SegmentClosed { lap: 4, duration_s: 2.5, completed: false }]);
        assert!(seg.finish().is_empty());
        assert_eq!(seg.current_lap(), None);
    }

    #[test]
    fn row_lap_time_is_relative_to_segment_start() {
        let mut seg = Segmenter::default();
        seg.step(sample(0, 100.0, 0.0));
        let events = seg.step(sample(0, 101.5, 1.0));
        match &events[0] {
            SegmentEvent::Row { lap_time_s, .. } => assert!((lap_time_s - 1.5).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn end_to_end_two_laps() {
        let mut seg = Segmenter::default();
        let samples = (0..150).map(|t| {
            let lap = if t < 100 { 3 } else { 4 };
            Sample { tick: t, ..sample(lap, t as f64 * 0.1, t as f64) }
        });
        let events: Vec<_> = samples.flat_map(|s| seg.step(s)).collect();

        let rows = |lap: i32| events.iter().filter(|e| matches!(e, SegmentEvent::Row { lap: l, .. } if *l == lap)).count();
        assert_eq!(rows(3), 100);
        assert_eq!(rows(4), 50);

        let closes: Vec<_> = events.iter().filter(|e| matches!(e, SegmentEvent::SegmentClosed { .. })).collect();
        assert_eq!(closes.len(), 1);
        match closes[0] {
            SegmentEvent::SegmentClosed { lap, duration_s, completed } => {
                assert_eq!(*lap, 3);
                assert!(*completed);
                assert!((duration_s - 9.9).abs() < 1e-9);
            }
            _ => unreachable!(),
        }
        let opens: Vec<_> = events.iter().filter_map(|e| match e {
            SegmentEvent::SegmentOpened { lap } => Some(*lap),
            _ => None,
        }).collect();
        assert_eq!(opens, vec![3, 4]);
        assert_eq!(seg.current_lap(), Some(4));
    }

    #[test]
    fn non_finite_positions_do_not_poison_distance() {
        let mut seg = Segmenter::default();
        seg.step(sample(0, 0.0, 0.0));
        assert!(seg.step(sample(0, 0.1, f64::NAN)).is_empty());
        assert_eq!(seg.accumulated_distance(), 0.0);
    }

    proptest! {
        #[test]
        fn step_is_total(
            steps in proptest::collection::vec((-3i32..30, -5.0f64..200.0, -50.0f64..50.0), 1..200)
        ) {
            let mut seg = Segmenter::default();
            let mut open = 0i32;
            for (lap, clock, x) in steps {
                for e in seg.step(sample(lap, clock, x)) {
                    match e {
                        SegmentEvent::SegmentOpened { .. } => open += 1,
                        SegmentEvent::SegmentClosed { .. } => open -= 1,
                        _ => {}
                    }
                    prop_assert!((0..=1).contains(&open));
                }
                prop_assert_eq!(open, 1);
            }
            for e in seg.finish() {
                if let SegmentEvent::SegmentClosed { .. } = e { open -= 1 }
            }
            prop_assert_eq!(open, 0);
        }
    }
}
