//! Authoring state machine
//!
//! Turns control-surface events into edits of a channel × slot grid of
//! patterns and publishes the active pattern over a [`Distributor`].
//!
//! State is split in two tiers:
//! - hot scalars read on every render cycle (current step, active channel,
//!   active slot) live in atomics and never wait on a lock;
//! - the rarely touched UI state (mode, picked color, held live pads) sits
//!   behind one coarse mutex.
//!
//! Each grid cell is its own [`ColorPattern`] with its own lock.
//!
//! Publications go through a single publisher task fed by a bounded queue,
//! so sends leave in edit order and a slow socket applies backpressure to
//! the control loop instead of piling up detached sends.

use crate::clock::Ticks;
use crate::color::{blend_over, scale_velocity, Rgba};
use crate::config::ControllerConfig;
use crate::distributor::Distributor;
use crate::error::{Error, Result};
use crate::palette::Palette;
use crate::pattern::{ColorPattern, PatternGrid};
use crate::shutdown::Shutdown;
use crate::surface::{
    Button, ControlSurface, Intensity, LightLevel, Lights, Pad, PadAction, PadColor, PadEvent,
    PadLight, SurfaceEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

const PUBLISH_QUEUE_DEPTH: usize = 32;

/// What the pads do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// Pick the color used by step edits
    Color,
    /// Toggle steps of the active pattern
    Step,
    /// Select the active pattern slot
    Pattern,
    /// Momentary pads blended into one color
    Live,
}

impl fmt::Display for PadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PadMode::Color => "color",
            PadMode::Step => "step",
            PadMode::Pattern => "pattern",
            PadMode::Live => "live",
        };
        f.write_str(name)
    }
}

/// When the active pattern is re-sent on the keepalive timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepalivePolicy {
    /// Only while channel 0 (the wildcard channel) is active
    #[default]
    MasterOnly,
    AllChannels,
    Off,
}

/// Side effects requested by one surface event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reaction {
    pub publish: bool,
    pub channel_changed: bool,
}

/// One encoded pattern ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub channel: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct UiState {
    mode: PadMode,
    picked: PadColor,
    live_pressed: BTreeMap<Pad, u16>,
}

pub struct Controller {
    palette: Arc<Palette>,
    grid: PatternGrid,
    steps: usize,

    current_step: AtomicUsize,
    active_channel: AtomicU64,
    active_slot: AtomicUsize,

    ui: Mutex<UiState>,

    refresh: Duration,
    keepalive_period: Duration,
    keepalive: KeepalivePolicy,
}

impl Controller {
    pub fn new(palette: Arc<Palette>, config: &ControllerConfig, steps: usize) -> Self {
        Self {
            palette,
            grid: PatternGrid::new(config.channels, config.slots, steps),
            steps,
            current_step: AtomicUsize::new(0),
            active_channel: AtomicU64::new(0),
            active_slot: AtomicUsize::new(0),
            ui: Mutex::new(UiState {
                mode: PadMode::Color,
                picked: PadColor::White,
                live_pressed: BTreeMap::new(),
            }),
            refresh: config.refresh(),
            keepalive_period: config.publish(),
            keepalive: config.keepalive,
        }
    }

    pub fn mode(&self) -> PadMode {
        self.ui().mode
    }

    pub fn picked(&self) -> PadColor {
        self.ui().picked
    }

    pub fn active_channel(&self) -> u64 {
        self.active_channel.load(Ordering::Acquire)
    }

    pub fn active_slot(&self) -> usize {
        self.active_slot.load(Ordering::Acquire)
    }

    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Acquire)
    }

    pub fn pattern(&self, channel: u64, slot: usize) -> Option<&ColorPattern> {
        self.grid.get(usize::try_from(channel).ok()?, slot)
    }

    /// Pattern at the active (channel, slot)
    pub fn active_pattern(&self) -> Option<&ColorPattern> {
        self.pattern(self.active_channel(), self.active_slot())
    }

    pub fn on_tick(&self, tick: i64) {
        let step = tick.rem_euclid(self.steps.max(1) as i64) as usize;
        self.current_step.store(step, Ordering::Release);
    }

    /// Apply one surface event
    pub fn handle_event(&self, event: &SurfaceEvent) -> Reaction {
        match event {
            SurfaceEvent::Buttons(pressed) => self.on_buttons(pressed),
            SurfaceEvent::Pad(pad) => self.on_pad(pad),
        }
    }

    fn on_buttons(&self, pressed: &[Button]) -> Reaction {
        let mut reaction = Reaction::default();

        for &button in pressed {
            if let Some(mode) = self.palette.mode_for(button) {
                self.ui().mode = mode;
                debug!("Pad mode: {}", mode);
                continue;
            }

            match button {
                Button::ArrowRight => {
                    self.shift_channel(1);
                    reaction.channel_changed = true;
                }
                Button::ArrowLeft => {
                    self.shift_channel(-1);
                    reaction.channel_changed = true;
                }
                _ => {}
            }
        }

        reaction
    }

    fn shift_channel(&self, delta: i64) {
        let channels = self.grid.channel_count() as u64;
        let moved = self
            .active_channel
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ch| {
                let next = ch as i64 + delta;
                (next >= 0 && (next as u64) < channels).then_some(next as u64)
            });
        if let Ok(previous) = moved {
            debug!("Active channel {} -> {}", previous, previous as i64 + delta);
        }
    }

    fn on_pad(&self, event: &PadEvent) -> Reaction {
        let mode = self.mode();
        let edited = match mode {
            PadMode::Color => {
                self.pick_color(event);
                false
            }
            PadMode::Step => self.toggle_step(event),
            PadMode::Pattern => self.select_slot(event),
            PadMode::Live => self.press_live(event),
        };

        Reaction {
            publish: edited,
            channel_changed: false,
        }
    }

    fn pick_color(&self, event: &PadEvent) {
        if event.action != PadAction::Released {
            return;
        }
        if let Some(color) = self.palette.swatch_for(event.pad) {
            self.ui().picked = color;
            debug!("Picked {:?}", color);
        }
    }

    /// Lit steps are cleared, unlit steps take the picked color
    fn toggle_step(&self, event: &PadEvent) -> bool {
        if event.action != PadAction::Released {
            return false;
        }
        let Some(pattern) = self.active_pattern() else {
            return false;
        };
        let step = event.pad.index();
        let Some(current) = pattern.color_at(step) else {
            return false;
        };

        let next = if self.palette.nearest(current) == PadColor::Off {
            self.palette.rgba(self.picked())
        } else {
            self.palette.rgba(PadColor::Off)
        };
        pattern.set_color_at(step, next)
    }

    fn select_slot(&self, event: &PadEvent) -> bool {
        if event.action != PadAction::Released {
            return false;
        }
        let slot = event.pad.index();
        if slot >= self.grid.slot_count() {
            return false;
        }
        self.active_slot.store(slot, Ordering::Release);
        debug!("Active slot {}", slot);
        true
    }

    fn press_live(&self, event: &PadEvent) -> bool {
        let mut ui = self.ui();
        match event.action {
            PadAction::Touched => {
                ui.live_pressed.insert(event.pad, event.velocity);
            }
            PadAction::Released => {
                ui.live_pressed.remove(&event.pad);
            }
        }
        true
    }

    /// Transient pattern with every step set to the blend of held live pads
    ///
    /// Held pads contribute their swatch at an alpha scaled from pressure,
    /// composited in pad order. Zero-pressure pads are skipped.
    pub fn live_pattern(&self) -> ColorPattern {
        let colors: Vec<Rgba> = {
            let ui = self.ui();
            ui.live_pressed
                .iter()
                .filter(|(_, velocity)| **velocity > 0)
                .filter_map(|(pad, velocity)| {
                    self.palette
                        .swatch_for(*pad)
                        .map(|c| self.palette.rgba(c).with_alpha(scale_velocity(*velocity)))
                })
                .collect()
        };

        ColorPattern::filled(self.steps, blend_over(&colors))
    }

    /// Encode what receivers should currently play
    pub fn publication(&self) -> Publication {
        let channel = self.active_channel();
        let payload = match self.mode() {
            PadMode::Live => self.live_pattern().encode(channel),
            _ => match self.active_pattern() {
                Some(pattern) => pattern.encode(channel),
                None => ColorPattern::new(self.steps).encode(channel),
            },
        };
        Publication { channel, payload }
    }

    pub fn should_keepalive(&self) -> bool {
        match self.keepalive {
            KeepalivePolicy::MasterOnly => self.active_channel() == 0,
            KeepalivePolicy::AllChannels => true,
            KeepalivePolicy::Off => false,
        }
    }

    pub fn status_line(&self) -> String {
        format!("chan: {}", self.active_channel())
    }

    /// Light snapshot for the current mode
    pub fn lights(&self) -> Lights {
        let mut lights = Lights::default();
        let mode = self.mode();

        for button in Button::ALL {
            lights.buttons[button.index()] = match self.palette.mode_for(button) {
                Some(m) if m == mode => Intensity::High,
                Some(_) => Intensity::Low,
                None => Intensity::Off,
            };
        }
        lights.buttons[Button::ArrowLeft.index()] = Intensity::Medium;
        lights.buttons[Button::ArrowRight.index()] = Intensity::Medium;

        match mode {
            PadMode::Color => self.color_mode_pads(&mut lights),
            PadMode::Step => self.step_mode_pads(&mut lights),
            PadMode::Pattern => self.pattern_mode_pads(&mut lights),
            PadMode::Live => self.live_mode_pads(&mut lights),
        }

        lights
    }

    fn color_mode_pads(&self, lights: &mut Lights) {
        let picked = self.picked();
        for pad in Pad::all() {
            lights.pads[pad.index()] = match self.palette.swatch_for(pad) {
                Some(color) => PadLight {
                    color,
                    level: if color == picked {
                        LightLevel::High
                    } else {
                        LightLevel::Low
                    },
                },
                None => PadLight::default(),
            };
        }
    }

    fn step_mode_pads(&self, lights: &mut Lights) {
        let step = self.current_step();
        let pattern = self.active_pattern();

        for pad in Pad::all() {
            let idx = pad.index();
            let stored = pattern.and_then(|p| p.color_at(idx));
            let color = stored.map_or(PadColor::Off, |c| self.palette.nearest(c));

            lights.pads[idx] = match (idx == step, color) {
                (true, PadColor::Off) => PadLight {
                    color: PadColor::White,
                    level: LightLevel::Low,
                },
                (true, color) => PadLight {
                    color,
                    level: LightLevel::Faded,
                },
                (false, color) => PadLight {
                    color,
                    level: LightLevel::High,
                },
            };
        }
    }

    fn pattern_mode_pads(&self, lights: &mut Lights) {
        let active = self.active_slot();
        let step = self.current_step();
        let channel = self.active_channel();

        for pad in Pad::all() {
            let idx = pad.index();
            let color = self
                .pattern(channel, idx)
                .and_then(|p| p.color_at(step))
                .map_or(PadColor::Off, |c| self.palette.nearest(c));

            lights.pads[idx] = match (idx == active, color) {
                (true, PadColor::Off) => PadLight {
                    color: PadColor::White,
                    level: LightLevel::Low,
                },
                (true, color) => PadLight {
                    color,
                    level: LightLevel::Faded,
                },
                (false, color) => PadLight {
                    color,
                    level: LightLevel::High,
                },
            };
        }
    }

    fn live_mode_pads(&self, lights: &mut Lights) {
        let ui = self.ui();
        for pad in Pad::all() {
            let held = ui.live_pressed.get(&pad).is_some_and(|v| *v > 0);
            lights.pads[pad.index()] = PadLight {
                color: self.palette.swatch_for(pad).unwrap_or(PadColor::Off),
                level: if held {
                    LightLevel::Faded
                } else {
                    LightLevel::High
                },
            };
        }
    }

    /// Drive the controller until the surface closes, a leaf loop fails or
    /// `shutdown` fires
    ///
    /// Multiplexes surface events, ticks, the light refresh cadence, the
    /// keepalive cadence and the publisher task in one select loop.
    pub async fn run<S: ControlSurface>(
        &self,
        surface: &mut S,
        mut events: mpsc::Receiver<SurfaceEvent>,
        mut ticks: Ticks,
        publisher: Distributor,
        shutdown: Shutdown,
    ) -> Result<()> {
        let (queue, mut publishing) = spawn_publisher(publisher);

        let mut refresh = tokio::time::interval(self.refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut keepalive =
            tokio::time::interval_at(Instant::now() + self.keepalive_period, self.keepalive_period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        surface.set_status(&self.status_line())?;
        info!(
            "Controller running: {} channels x {} slots x {} steps",
            self.grid.channel_count(),
            self.grid.slot_count(),
            self.steps
        );

        let mut publisher_finished = false;
        let result: Result<()> = loop {
            tokio::select! {
                _ = shutdown.triggered() => break Ok(()),

                done = &mut publishing => {
                    publisher_finished = true;
                    break Err(match done {
                        Ok(Err(e)) => e,
                        _ => Error::PublisherStopped,
                    });
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Control surface closed");
                        break Ok(());
                    };
                    let reaction = self.handle_event(&event);
                    if reaction.channel_changed {
                        if let Err(e) = surface.set_status(&self.status_line()) {
                            break Err(e);
                        }
                    }
                    if reaction.publish && queue.send(self.publication()).await.is_err() {
                        break Err(Error::PublisherStopped);
                    }
                }

                tick = ticks.next() => match tick {
                    Some(tick) => self.on_tick(tick),
                    None => break Err(Error::TickSourceStopped),
                },

                _ = refresh.tick() => {
                    if let Err(e) = surface.set_lights(&self.lights()) {
                        break Err(e);
                    }
                }

                _ = keepalive.tick() => {
                    if self.should_keepalive() && queue.send(self.publication()).await.is_err() {
                        break Err(Error::PublisherStopped);
                    }
                }
            }
        };

        // Let queued publications drain before returning
        drop(queue);
        if !publisher_finished {
            if let Ok(Err(e)) = publishing.await {
                debug!("Publisher stopped during shutdown: {}", e);
            }
        }

        result
    }

    fn ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_publisher(publisher: Distributor) -> (mpsc::Sender<Publication>, JoinHandle<Result<()>>) {
    let (tx, mut rx) = mpsc::channel::<Publication>(PUBLISH_QUEUE_DEPTH);

    let handle = tokio::spawn(async move {
        while let Some(publication) = rx.recv().await {
            publisher.send(&publication.payload).await?;
            trace!(
                "Published {} bytes on channel {}",
                publication.payload.len(),
                publication.channel
            );
        }
        Ok(())
    });

    (tx, handle)
}
