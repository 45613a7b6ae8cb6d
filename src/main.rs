//! beatcast CLI - author, play and inspect multicast color patterns

use beatcast::clock::{FreeRunningClock, LocalBeatClock, PhaseLockedClock, TickSource};
use beatcast::color::Rgba;
use beatcast::config::{ClockKind, Config};
use beatcast::controller::Controller;
use beatcast::distributor::Distributor;
use beatcast::palette::Palette;
use beatcast::player::{self, Player};
use beatcast::render::{DmxUniverse, RgbaFrame};
use beatcast::shutdown::Shutdown;
use beatcast::terminal::{SwatchDisplay, TerminalSurface};
use beatcast::{logging, Error};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Frames buffered between the player and a slow display
const FRAME_QUEUE_DEPTH: usize = 2;

#[derive(Parser)]
#[command(name = "beatcast")]
#[command(about = "Beat-synchronized color patterns over UDP multicast", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/beatcast/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Multicast group and port, e.g. 224.2.2.3:9999
    #[arg(short, long, global = true)]
    group: Option<SocketAddrV4>,

    /// Tempo of the local beat clock
    #[arg(long, global = true)]
    bpm: Option<f64>,

    /// Tick on a fixed interval instead of following the beat
    #[arg(long, global = true)]
    free: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit and broadcast patterns from the keyboard
    Control,

    /// Play the pattern for one channel
    Play {
        /// Channel to play (0 plays only wildcard messages)
        #[arg(short, long)]
        channel: Option<u64>,

        /// Where frames go
        #[arg(short, long, value_enum, default_value = "swatch")]
        output: Output,
    },

    /// Log every pattern seen on the group
    Monitor,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    /// Full-screen terminal color swatch
    Swatch,
    /// Log each color change
    Log,
    /// Log the DMX slots of an RGB fixture
    Dmx,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(group) = cli.group {
        config.network.group = group;
    }
    if let Some(bpm) = cli.bpm {
        config.clock.bpm = bpm;
    }
    if cli.free {
        config.clock.kind = ClockKind::Free;
    }
    if let Commands::Play {
        channel: Some(channel),
        ..
    } = &cli.command
    {
        config.player.channel = *channel;
    }
    config.validate()?;

    let full_screen = matches!(
        cli.command,
        Commands::Control
            | Commands::Play {
                output: Output::Swatch,
                ..
            }
    );
    let log_file = match (&config.log_file, full_screen) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(std::env::temp_dir().join("beatcast.log")),
        (None, false) => None,
    };
    logging::init(log_file.as_deref())?;

    let shutdown = Shutdown::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            on_signal.trigger();
        }
    });

    match cli.command {
        Commands::Control => {
            let clock = build_clock(&config)?;
            control(&config, clock.as_ref(), shutdown).await?;
        }

        Commands::Play { output, .. } => {
            let clock = build_clock(&config)?;
            play(&config, clock.as_ref(), output, shutdown).await?;
        }

        Commands::Monitor => {
            let subscriber =
                Distributor::subscriber(config.network.group, config.network.interface).await?;
            player::monitor(subscriber, config.pattern.steps, shutdown).await?;
        }
    }

    Ok(())
}

fn build_clock(config: &Config) -> beatcast::Result<Box<dyn TickSource>> {
    let clock = &config.clock;
    Ok(match clock.kind {
        ClockKind::Free => Box::new(FreeRunningClock::new(clock.interval())),
        ClockKind::Beat => {
            let reference = Arc::new(LocalBeatClock::new(clock.bpm)?);
            info!("Local beat clock at {} BPM", clock.bpm);
            Box::new(PhaseLockedClock::new(
                reference,
                clock.quantum,
                clock.subdivision,
            )?)
        }
    })
}

async fn control(
    config: &Config,
    clock: &dyn TickSource,
    shutdown: Shutdown,
) -> beatcast::Result<()> {
    let palette = Arc::new(Palette::new());
    let controller = Controller::new(
        Arc::clone(&palette),
        &config.controller,
        config.pattern.steps,
    );
    let publisher = Distributor::publisher(config.network.group).await?;

    let ticks = clock.ticks();
    clock.start();

    let (mut surface, events) = TerminalSurface::open(palette)?;
    let result = controller
        .run(&mut surface, events, ticks, publisher, shutdown)
        .await;
    surface.close()?;
    result
}

async fn play(
    config: &Config,
    clock: &dyn TickSource,
    output: Output,
    shutdown: Shutdown,
) -> beatcast::Result<()> {
    let channel = config.player.channel;
    let (width, height) = (config.player.width, config.player.height);
    let player = Player::new(channel, config.pattern.steps, config.player.refresh());
    let subscriber =
        Distributor::subscriber(config.network.group, config.network.interface).await?;

    let ticks = clock.ticks();
    clock.start();

    match output {
        Output::Swatch => {
            let mut display = SwatchDisplay::open(format!("chan {}", channel), shutdown.clone())?;
            let (frames_tx, mut frames) = mpsc::channel::<RgbaFrame>(FRAME_QUEUE_DEPTH);
            let show = async {
                while let Some(frame) = frames.recv().await {
                    display.show(&frame)?;
                }
                Ok::<(), Error>(())
            };
            let render = |color| RgbaFrame::solid(color, width, height);
            let (played, shown) =
                tokio::join!(player.run(subscriber, ticks, render, frames_tx, shutdown), show);
            display.close()?;
            shown.and(played)
        }

        Output::Log => {
            let (frames_tx, mut frames) = mpsc::channel::<Rgba>(FRAME_QUEUE_DEPTH);
            let log = async {
                let mut last = None;
                while let Some(color) = frames.recv().await {
                    if last != Some(color) {
                        info!("chan {}: {}", channel, color);
                        last = Some(color);
                    }
                }
            };
            let (played, ()) =
                tokio::join!(player.run(subscriber, ticks, |c| c, frames_tx, shutdown), log);
            played
        }

        Output::Dmx => {
            let (frames_tx, mut frames) = mpsc::channel::<DmxUniverse>(FRAME_QUEUE_DEPTH);
            let log = async {
                let mut last: Option<DmxUniverse> = None;
                while let Some(universe) = frames.recv().await {
                    if last.as_ref() != Some(&universe) {
                        let rgb = &universe.as_bytes()[..3];
                        info!("dmx 1-3: {} {} {}", rgb[0], rgb[1], rgb[2]);
                        last = Some(universe);
                    }
                }
            };
            let render = DmxUniverse::from_color;
            let (played, ()) =
                tokio::join!(player.run(subscriber, ticks, render, frames_tx, shutdown), log);
            played
        }
    }
}
