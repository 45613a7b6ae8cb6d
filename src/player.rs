//! Playback client
//!
//! A [`Player`] keeps one cached pattern fed from the network and samples it
//! on its own render cadence:
//!
//! - a spawned receive loop blocks on the subscriber and merges every
//!   datagram into the cache,
//! - ticks move the playhead,
//! - a fixed-rate timer reads the color under the playhead, passes it through
//!   the render callback and hands the frame to the sink.
//!
//! The three cadences are independent. Frames keep flowing when the network
//! stalls, and a slow sink drops frames instead of holding up ticks.

use crate::clock::Ticks;
use crate::color::Rgba;
use crate::distributor::{DatagramSource, Distributor};
use crate::error::{Error, Result};
use crate::pattern::{ColorPattern, MergeOutcome};
use crate::shutdown::Shutdown;
use crate::wire::{wire_len, WireMessage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

pub struct Player {
    cache: Arc<ColorPattern>,
    channel: u64,
    steps: usize,
    current_step: AtomicUsize,
    refresh: Duration,
}

impl Player {
    pub fn new(channel: u64, steps: usize, refresh: Duration) -> Self {
        Self {
            cache: Arc::new(ColorPattern::new(steps)),
            channel,
            steps: steps.max(1),
            current_step: AtomicUsize::new(0),
            refresh,
        }
    }

    pub fn channel(&self) -> u64 {
        self.channel
    }

    /// Pattern the receive loop writes into
    pub fn cache(&self) -> &Arc<ColorPattern> {
        &self.cache
    }

    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn on_tick(&self, tick: i64) {
        let step = tick.rem_euclid(self.steps as i64) as usize;
        self.current_step.store(step, Ordering::Relaxed);
    }

    /// Cached color under the playhead
    pub fn current_color(&self) -> Rgba {
        self.cache
            .color_at(self.current_step())
            .unwrap_or_default()
    }

    /// Play until `shutdown` fires, the receive loop fails or the frame sink
    /// goes away
    pub async fn run<S, F, T>(
        &self,
        subscriber: S,
        mut ticks: Ticks,
        mut render: F,
        frames: mpsc::Sender<T>,
        shutdown: Shutdown,
    ) -> Result<()>
    where
        S: DatagramSource,
        F: FnMut(Rgba) -> T,
    {
        let mut receiving = tokio::spawn(receive_loop(
            Arc::new(subscriber),
            Arc::clone(&self.cache),
            self.channel,
            shutdown.clone(),
        ));

        let mut refresh = tokio::time::interval(self.refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Playing channel {} ({} steps, frame every {:?})",
            self.channel, self.steps, self.refresh
        );

        let mut dropped = 0u64;
        let result = loop {
            tokio::select! {
                _ = shutdown.triggered() => break Ok(()),

                done = &mut receiving => {
                    break match done {
                        Ok(result) => result,
                        Err(e) => Err(Error::Receive(std::io::Error::other(e.to_string()))),
                    };
                }

                tick = ticks.next() => match tick {
                    Some(tick) => self.on_tick(tick),
                    None => break Err(Error::TickSourceStopped),
                },

                _ = refresh.tick() => {
                    let frame = render(self.current_color());
                    match frames.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            dropped += 1;
                            trace!("Frame sink busy, dropped frame ({} so far)", dropped);
                        }
                        Err(TrySendError::Closed(_)) => {
                            info!("Frame sink closed");
                            break Ok(());
                        }
                    }
                }
            }
        };

        receiving.abort();
        if dropped > 0 {
            debug!("Dropped {} frames on a busy sink", dropped);
        }
        result
    }
}

/// Merge every datagram from `subscriber` into `cache` until `shutdown`
///
/// A read error after shutdown was requested counts as a normal stop; any
/// other read error ends the loop with that error.
pub async fn receive_loop<S: DatagramSource>(
    subscriber: Arc<S>,
    cache: Arc<ColorPattern>,
    channel: u64,
    shutdown: Shutdown,
) -> Result<()> {
    let mut buf = vec![0u8; wire_len(cache.len())];

    loop {
        let received = tokio::select! {
            _ = shutdown.triggered() => return Ok(()),
            received = subscriber.next_datagram(&mut buf) => received,
        };

        let len = match received {
            Ok(len) => len,
            Err(_) if shutdown.is_triggered() => return Ok(()),
            Err(e) => return Err(e),
        };

        match cache.decode(&buf[..len], channel) {
            MergeOutcome::Applied => trace!("Applied pattern update"),
            MergeOutcome::ForeignChannel(other) => {
                trace!("Ignored update for channel {}", other)
            }
            MergeOutcome::Truncated { len } => {
                warn!("Ignored short datagram ({} bytes)", len)
            }
        }
    }
}

/// Log every message seen on the group, whatever its channel
pub async fn monitor(subscriber: Distributor, steps: usize, shutdown: Shutdown) -> Result<()> {
    let mut buf = vec![0u8; wire_len(steps)];
    let mut seen = 0u64;

    loop {
        let received = tokio::select! {
            _ = shutdown.triggered() => break,
            received = subscriber.receive(&mut buf) => received,
        };
        let len = match received {
            Ok(len) => len,
            Err(_) if shutdown.is_triggered() => break,
            Err(e) => return Err(e),
        };

        match WireMessage::decode(&buf[..len], steps) {
            Ok(message) => {
                seen += 1;
                let colors: Vec<String> = message.steps.iter().map(Rgba::to_string).collect();
                info!("chan {}: {}", message.channel, colors.join(" "));
            }
            Err(e) => warn!("{}", e),
        }
    }

    info!("Monitor saw {} messages", seen);
    subscriber.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use tokio::time::timeout;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    /// Hands out queued replies, then waits forever
    struct Scripted {
        replies: Mutex<VecDeque<Result<Vec<u8>>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl DatagramSource for Scripted {
        async fn next_datagram(&self, buf: &mut [u8]) -> Result<usize> {
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Ok(bytes)) => {
                    let len = bytes.len().min(buf.len());
                    buf[..len].copy_from_slice(&bytes[..len]);
                    Ok(len)
                }
                Some(Err(e)) => Err(e),
                None => std::future::pending().await,
            }
        }
    }

    /// Requests shutdown, then fails the read the way a closed socket does
    struct ClosedOnShutdown(Shutdown);

    #[async_trait]
    impl DatagramSource for ClosedOnShutdown {
        async fn next_datagram(&self, _buf: &mut [u8]) -> Result<usize> {
            self.0.trigger();
            Err(Error::Receive(io::Error::other("socket closed")))
        }
    }

    fn link_down() -> Result<Vec<u8>> {
        Err(Error::Receive(io::Error::other("link down")))
    }

    #[test]
    fn test_starts_black_at_step_zero() {
        let player = Player::new(1, 16, Duration::from_millis(50));
        assert_eq!(player.current_step(), 0);
        assert_eq!(player.current_color(), Rgba::BLACK);
    }

    #[test]
    fn test_playhead_follows_ticks() {
        let player = Player::new(1, 4, Duration::from_millis(50));
        player.cache().set_color_at(2, Rgba::new(0, 0, 255, 255));
        player.on_tick(6);
        assert_eq!(player.current_step(), 2);
        assert_eq!(player.current_color(), Rgba::new(0, 0, 255, 255));
        player.on_tick(7);
        assert_eq!(player.current_color(), Rgba::BLACK);
    }

    #[tokio::test]
    async fn test_read_error_mid_run_is_fatal() {
        let source = Scripted::new(vec![Ok(ColorPattern::filled(4, RED).encode(1)), link_down()]);
        let cache = Arc::new(ColorPattern::new(4));

        let result = timeout(
            Duration::from_secs(2),
            receive_loop(Arc::new(source), Arc::clone(&cache), 1, Shutdown::new()),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(Error::Receive(_))));
        // Updates merged before the failure stay applied
        assert_eq!(cache.color_at(3), Some(RED));
    }

    #[tokio::test]
    async fn test_read_error_after_shutdown_is_a_normal_stop() {
        let shutdown = Shutdown::new();
        let source = Arc::new(ClosedOnShutdown(shutdown.clone()));
        let cache = Arc::new(ColorPattern::new(4));

        let result = timeout(
            Duration::from_secs(2),
            receive_loop(source, cache, 1, shutdown.clone()),
        )
        .await
        .unwrap();

        assert!(shutdown.is_triggered());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_ends_with_the_read_error() {
        let player = Player::new(1, 4, Duration::from_millis(5));
        let source = Scripted::new(vec![link_down()]);
        let (frames_tx, _frames) = mpsc::channel::<Rgba>(64);
        let (_ticks_tx, ticks_rx) = mpsc::channel(4);
        let shutdown = Shutdown::new();

        let result = timeout(
            Duration::from_secs(2),
            player.run(
                source,
                Ticks::from_receiver(ticks_rx),
                |c| c,
                frames_tx,
                shutdown.clone(),
            ),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(Error::Receive(_))));
        assert!(!shutdown.is_triggered());
    }
}
