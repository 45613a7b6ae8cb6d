//! Tick sources: quantized, tempo-synchronized step counters
//!
//! A [`TickSource`] produces a non-decreasing stream of integer ticks, one per
//! elapsed subdivision. Consumers derive the active step with `tick mod N`;
//! the source never knows N.
//!
//! Two sources are provided:
//! - [`FreeRunningClock`] emits on a fixed wall-clock interval, for setups
//!   without a tempo reference.
//! - [`PhaseLockedClock`] polls a shared [`BeatClock`] every
//!   [`PHASE_POLL_INTERVAL`] and emits only when the quantized step index has
//!   strictly advanced. Steps shorter than the poll interval are skipped.

use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Fixed polling period of the phase-locked source
pub const PHASE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default period of the free-running source
pub const DEFAULT_FREE_INTERVAL: Duration = Duration::from_millis(200);

const TICK_QUEUE_DEPTH: usize = 64;

/// Stream of ticks handed out by a [`TickSource`]
#[derive(Debug)]
pub struct Ticks {
    rx: mpsc::Receiver<i64>,
}

impl Ticks {
    /// Wrap a raw channel, e.g. to feed ticks by hand
    pub fn from_receiver(rx: mpsc::Receiver<i64>) -> Self {
        Self { rx }
    }

    /// Next tick; `None` only once the producer has gone away
    pub async fn next(&mut self) -> Option<i64> {
        self.rx.recv().await
    }
}

/// Source of quantized time
///
/// `ticks` spawns its producer on the current tokio runtime. Ticks flow only
/// after `start` has been called; a stream requested earlier simply waits.
/// The producer stops when its [`Ticks`] is dropped.
pub trait TickSource {
    fn start(&self);
    fn ticks(&self) -> Ticks;
}

async fn wait_started(mut started: watch::Receiver<bool>) -> bool {
    started.wait_for(|s| *s).await.is_ok()
}

/// Emits 0, 1, 2, ... on a fixed interval
#[derive(Debug)]
pub struct FreeRunningClock {
    interval: Duration,
    started: watch::Sender<bool>,
}

impl FreeRunningClock {
    pub fn new(interval: Duration) -> Self {
        let (started, _) = watch::channel(false);
        Self { interval, started }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FreeRunningClock {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_INTERVAL)
    }
}

impl TickSource for FreeRunningClock {
    fn start(&self) {
        info!("Free-running clock started ({:?} per tick)", self.interval);
        self.started.send_replace(true);
    }

    fn ticks(&self) -> Ticks {
        let (tx, rx) = mpsc::channel(TICK_QUEUE_DEPTH);
        let started = self.started.subscribe();
        let period = self.interval;

        tokio::spawn(async move {
            if !wait_started(started).await {
                return;
            }

            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut tick = 0i64;
            loop {
                timer.tick().await;
                if tx.send(tick).await.is_err() {
                    debug!("Tick consumer dropped, stopping free-running clock");
                    return;
                }
                tick += 1;
            }
        });

        Ticks { rx }
    }
}

/// Shared beat timeline the phase-locked source follows
///
/// Implementations wrap whatever keeps tempo for the session. Only the beat
/// position is consumed.
pub trait BeatClock: Send + Sync + 'static {
    /// Beat position at `at`, aligned to a bar of `quantum` beats
    fn beat_at(&self, at: Instant, quantum: f64) -> f64;

    /// Join or leave the shared session
    fn enable(&self, _enabled: bool) {}

    /// Check the reference is reachable; called once at construction
    fn handshake(&self) -> Result<()> {
        Ok(())
    }
}

/// Derives step indices from beat positions, suppressing repeats
///
/// A step is reported only when it is strictly greater than every step
/// reported before, so the output never repeats and never goes backwards
/// even if the observed phase jitters.
#[derive(Debug, Clone)]
pub struct StepQuantizer {
    subdivision: f64,
    last: Option<i64>,
}

impl StepQuantizer {
    pub fn new(subdivision: u32) -> Self {
        Self {
            subdivision: subdivision as f64,
            last: None,
        }
    }

    pub fn advance(&mut self, beat: f64) -> Option<i64> {
        let step = (beat * self.subdivision).floor() as i64;
        match self.last {
            Some(last) if step <= last => None,
            _ => {
                self.last = Some(step);
                Some(step)
            }
        }
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }
}

/// Emits the subdivision index of a shared beat clock whenever it advances
pub struct PhaseLockedClock<B: BeatClock> {
    reference: Arc<B>,
    quantum: f64,
    subdivision: u32,
    started: watch::Sender<bool>,
}

impl<B: BeatClock> PhaseLockedClock<B> {
    /// Lock onto `reference` with `subdivision` ticks per beat
    ///
    /// This is the only place reference failures surface; once constructed
    /// the source never reports an error.
    pub fn new(reference: Arc<B>, quantum: f64, subdivision: u32) -> Result<Self> {
        if subdivision == 0 {
            return Err(Error::Config("subdivision must be at least 1".to_string()));
        }
        if !(quantum.is_finite() && quantum > 0.0) {
            return Err(Error::Config(format!("invalid quantum {}", quantum)));
        }
        reference.handshake()?;

        let (started, _) = watch::channel(false);
        Ok(Self {
            reference,
            quantum,
            subdivision,
            started,
        })
    }

    pub fn reference(&self) -> &Arc<B> {
        &self.reference
    }
}

impl<B: BeatClock> TickSource for PhaseLockedClock<B> {
    fn start(&self) {
        self.reference.enable(true);
        info!(
            "Phase-locked clock started ({} steps per beat, quantum {})",
            self.subdivision, self.quantum
        );
        self.started.send_replace(true);
    }

    fn ticks(&self) -> Ticks {
        let (tx, rx) = mpsc::channel(TICK_QUEUE_DEPTH);
        let started = self.started.subscribe();
        let reference = Arc::clone(&self.reference);
        let quantum = self.quantum;
        let mut quantizer = StepQuantizer::new(self.subdivision);

        tokio::spawn(async move {
            if !wait_started(started).await {
                return;
            }

            let mut poll = tokio::time::interval(PHASE_POLL_INTERVAL);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                poll.tick().await;
                let beat = reference.beat_at(Instant::now(), quantum);
                if let Some(step) = quantizer.advance(beat) {
                    if tx.send(step).await.is_err() {
                        debug!("Tick consumer dropped, stopping phase-locked clock");
                        return;
                    }
                }
            }
        });

        Ticks { rx }
    }
}

impl<B: BeatClock> Drop for PhaseLockedClock<B> {
    fn drop(&mut self) {
        self.reference.enable(false);
    }
}

#[derive(Debug)]
struct Timeline {
    bpm: f64,
    origin: Instant,
    beat_at_origin: f64,
}

/// In-process tempo reference
///
/// Beat 0 is the moment of construction. Tempo changes keep the beat
/// position continuous: the new tempo applies from the current beat onward.
/// Readers never block; the timeline is swapped atomically.
#[derive(Debug)]
pub struct LocalBeatClock {
    timeline: ArcSwap<Timeline>,
}

impl LocalBeatClock {
    pub fn new(bpm: f64) -> Result<Self> {
        validate_bpm(bpm)?;
        Ok(Self {
            timeline: ArcSwap::from_pointee(Timeline {
                bpm,
                origin: Instant::now(),
                beat_at_origin: 0.0,
            }),
        })
    }

    pub fn bpm(&self) -> f64 {
        self.timeline.load().bpm
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        validate_bpm(bpm)?;
        let now = Instant::now();
        let beat = self.beat_at(now, 1.0);
        self.timeline.store(Arc::new(Timeline {
            bpm,
            origin: now,
            beat_at_origin: beat,
        }));
        debug!("Tempo set to {} BPM at beat {:.3}", bpm, beat);
        Ok(())
    }
}

impl BeatClock for LocalBeatClock {
    fn beat_at(&self, at: Instant, _quantum: f64) -> f64 {
        let timeline = self.timeline.load();
        let elapsed = at.saturating_duration_since(timeline.origin).as_secs_f64();
        timeline.beat_at_origin + elapsed * timeline.bpm / 60.0
    }
}

fn validate_bpm(bpm: f64) -> Result<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(Error::TempoReference(format!("invalid tempo {} BPM", bpm)))
    }
}
