//! Tick sources under tokio's paused clock

use beatcast::clock::{
    BeatClock, FreeRunningClock, LocalBeatClock, PhaseLockedClock, TickSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

async fn collect(source: &dyn TickSource, count: usize) -> Vec<i64> {
    let mut ticks = source.ticks();
    source.start();
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        out.push(ticks.next().await.unwrap());
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_free_running_counts_up_on_interval() {
    let clock = FreeRunningClock::new(Duration::from_millis(200));
    let started = Instant::now();

    assert_eq!(collect(&clock, 4).await, vec![0, 1, 2, 3]);
    assert!(started.elapsed() >= Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn test_no_ticks_before_start() {
    let clock = FreeRunningClock::new(Duration::from_millis(10));
    let mut ticks = clock.ticks();

    let early = tokio::time::timeout(Duration::from_secs(1), ticks.next()).await;
    assert!(early.is_err());

    clock.start();
    assert_eq!(ticks.next().await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_phase_locked_emits_every_subdivision() {
    // 120 BPM, 4 per beat: one step every 125 ms, well above the poll period
    let reference = Arc::new(LocalBeatClock::new(120.0).unwrap());
    let clock = PhaseLockedClock::new(reference, 4.0, 4).unwrap();

    assert_eq!(collect(&clock, 5).await, vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_phase_locked_ticks_strictly_increase() {
    // 3000 BPM at 4 per beat is 5 ms per step, shorter than the poll period
    let reference = Arc::new(LocalBeatClock::new(3000.0).unwrap());
    let clock = PhaseLockedClock::new(reference, 4.0, 4).unwrap();

    let ticks = collect(&clock, 20).await;
    assert!(ticks.windows(2).all(|w| w[1] > w[0]));
    assert!(ticks.windows(2).any(|w| w[1] - w[0] > 1));
}

#[tokio::test(start_paused = true)]
async fn test_tempo_change_keeps_beat_continuous() {
    let clock = LocalBeatClock::new(60.0).unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    let before = clock.beat_at(Instant::now(), 4.0);
    assert!((before - 2.0).abs() < 1e-6);

    clock.set_tempo(120.0).unwrap();
    assert!((clock.beat_at(Instant::now(), 4.0) - before).abs() < 1e-6);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!((clock.beat_at(Instant::now(), 4.0) - 4.0).abs() < 1e-6);
}

#[derive(Default)]
struct Session {
    enabled: AtomicBool,
}

impl BeatClock for Session {
    fn beat_at(&self, _at: Instant, _quantum: f64) -> f64 {
        0.0
    }

    fn enable(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_reference_joined_on_start_and_left_on_drop() {
    let session = Arc::new(Session::default());
    let clock = PhaseLockedClock::new(Arc::clone(&session), 4.0, 4).unwrap();
    assert!(!session.enabled.load(Ordering::SeqCst));

    clock.start();
    assert!(session.enabled.load(Ordering::SeqCst));

    drop(clock);
    assert!(!session.enabled.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_beat_produces_single_tick() {
    let session = Arc::new(Session::default());
    let clock = PhaseLockedClock::new(session, 4.0, 4).unwrap();
    let mut ticks = clock.ticks();
    clock.start();

    assert_eq!(ticks.next().await, Some(0));
    let next = tokio::time::timeout(Duration::from_secs(1), ticks.next()).await;
    assert!(next.is_err());
}
