//! Terminal stand-ins for the hardware: a keyboard control surface and a
//! color swatch display
//!
//! Both take over the terminal (raw mode + alternate screen) and restore it
//! on close or drop. Key input is read on a plain thread, since crossterm
//! reads block.
//!
//! Pad keys, laid out like the pad grid (bottom row first):
//!
//! ```text
//!   1 2 3 4     pads 12..15
//!   q w e r     pads  8..11
//!   a s d f     pads  4..7
//!   z x c v     pads  0..3
//! ```
//!
//! A key taps its pad (touch at full velocity, then release). With shift the
//! pad latches: the first press holds it down, the next one lets go, which
//! is how chords are played in live mode. F1..F4 select color, step, pattern
//! and live mode; Left/Right change channel; Esc or Ctrl-C quits.

use crate::color::{Rgba, MAX_VELOCITY};
use crate::error::{Error, Result};
use crate::palette::Palette;
use crate::render::RgbaFrame;
use crate::shutdown::Shutdown;
use crate::surface::{
    Button, ControlSurface, Intensity, LightLevel, Lights, Pad, PadAction, PadColor, PadEvent,
    SurfaceEvent, PAD_COUNT,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How often the input thread checks whether it should stop
const INPUT_POLL: Duration = Duration::from_millis(50);

const SURFACE_EVENT_DEPTH: usize = 64;

/// Pad keys, bottom row first
const PAD_ROWS: [&str; 4] = ["zxcv", "asdf", "qwer", "1234"];

/// Shifted digits on a US layout, standing in for pads 12..15
const SHIFTED_DIGITS: &str = "!@#$";

const BUTTON_LABELS: [(Button, &str); 6] = [
    (Button::PadMode, "F1 color"),
    (Button::Step, "F2 step"),
    (Button::Pattern, "F3 pattern"),
    (Button::Keyboard, "F4 live"),
    (Button::ArrowLeft, "< chan"),
    (Button::ArrowRight, "chan >"),
];

type Term = Terminal<CrosstermBackend<Stdout>>;

/// What one key press means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Events(Vec<SurfaceEvent>),
    Quit,
}

/// Key → surface event translation, including latched pads
#[derive(Debug, Default)]
pub struct KeyMap {
    latched: [bool; PAD_COUNT],
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, key: KeyEvent) -> KeyAction {
        let buttons = |b: Button| KeyAction::Events(vec![SurfaceEvent::Buttons(vec![b])]);

        match key.code {
            KeyCode::Esc => KeyAction::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
            KeyCode::F(1) => buttons(Button::PadMode),
            KeyCode::F(2) => buttons(Button::Step),
            KeyCode::F(3) => buttons(Button::Pattern),
            KeyCode::F(4) => buttons(Button::Keyboard),
            KeyCode::Left => buttons(Button::ArrowLeft),
            KeyCode::Right => buttons(Button::ArrowRight),
            KeyCode::Char(c) => match pad_for_char(c) {
                Some((pad, true)) => KeyAction::Events(vec![self.toggle_latch(pad)]),
                Some((pad, false)) => KeyAction::Events(vec![
                    pad_event(pad, MAX_VELOCITY, PadAction::Touched),
                    pad_event(pad, 0, PadAction::Released),
                ]),
                None => KeyAction::Events(Vec::new()),
            },
            _ => KeyAction::Events(Vec::new()),
        }
    }

    fn toggle_latch(&mut self, pad: Pad) -> SurfaceEvent {
        let held = &mut self.latched[pad.index()];
        *held = !*held;
        if *held {
            pad_event(pad, MAX_VELOCITY, PadAction::Touched)
        } else {
            pad_event(pad, 0, PadAction::Released)
        }
    }
}

/// Pad under `c`, and whether it was typed shifted
fn pad_for_char(c: char) -> Option<(Pad, bool)> {
    if let Some(i) = SHIFTED_DIGITS.find(c) {
        return Pad::new(12 + i).map(|p| (p, true));
    }
    let shifted = c.is_ascii_uppercase();
    let lower = c.to_ascii_lowercase();
    PAD_ROWS.iter().enumerate().find_map(|(row, keys)| {
        keys.find(lower)
            .and_then(|col| Pad::new(row * 4 + col))
            .map(|p| (p, shifted))
    })
}

fn pad_event(pad: Pad, velocity: u16, action: PadAction) -> SurfaceEvent {
    SurfaceEvent::Pad(PadEvent {
        pad,
        velocity,
        action,
    })
}

fn key_label(pad: Pad) -> char {
    let row = PAD_ROWS[pad.index() / 4];
    row.chars().nth(pad.index() % 4).unwrap_or('?')
}

fn surface_err(e: io::Error) -> Error {
    Error::Surface(e.to_string())
}

fn enter_terminal() -> Result<Term> {
    enable_raw_mode().map_err(surface_err)?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(surface_err)?;
    Terminal::new(CrosstermBackend::new(stdout)).map_err(surface_err)
}

fn leave_terminal(terminal: &mut Term) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Read keys on a thread until `stop` is set or `on_key` returns false
fn spawn_input<F>(stop: Arc<AtomicBool>, mut on_key: F) -> JoinHandle<()>
where
    F: FnMut(KeyEvent) -> bool + Send + 'static,
{
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(INPUT_POLL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Terminal input failed: {}", e);
                    return;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if !on_key(key) {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Terminal input failed: {}", e);
                    return;
                }
            }
        }
    })
}

/// Keyboard-driven [`ControlSurface`] drawn with ratatui
pub struct TerminalSurface {
    terminal: Option<Term>,
    palette: Arc<Palette>,
    lights: Lights,
    status: String,
    stop: Arc<AtomicBool>,
    input: Option<JoinHandle<()>>,
}

impl TerminalSurface {
    /// Take over the terminal and start reading keys
    ///
    /// The returned receiver yields surface events; it closes when the user
    /// quits.
    pub fn open(palette: Arc<Palette>) -> Result<(Self, mpsc::Receiver<SurfaceEvent>)> {
        let terminal = enter_terminal()?;
        let (tx, rx) = mpsc::channel(SURFACE_EVENT_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));

        let mut keymap = KeyMap::new();
        let input = spawn_input(Arc::clone(&stop), move |key| match keymap.translate(key) {
            KeyAction::Quit => false,
            KeyAction::Events(events) => events.into_iter().all(|e| tx.blocking_send(e).is_ok()),
        });

        Ok((
            Self {
                terminal: Some(terminal),
                palette,
                lights: Lights::default(),
                status: String::new(),
                stop,
                input: Some(input),
            },
            rx,
        ))
    }

    fn draw(&mut self) -> Result<()> {
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };
        let (lights, status, palette) = (&self.lights, &self.status, &self.palette);
        terminal
            .draw(|f| draw_surface(f, lights, status, palette))
            .map_err(surface_err)?;
        Ok(())
    }

    /// Stop the input thread and give the terminal back
    pub fn close(mut self) -> Result<()> {
        self.shutdown().map_err(surface_err)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(input) = self.input.take() {
            let _ = input.join();
        }
        match self.terminal.take() {
            Some(mut terminal) => leave_terminal(&mut terminal),
            None => Ok(()),
        }
    }
}

impl ControlSurface for TerminalSurface {
    fn set_lights(&mut self, lights: &Lights) -> Result<()> {
        if self.lights == *lights {
            return Ok(());
        }
        self.lights = lights.clone();
        self.draw()
    }

    fn set_status(&mut self, status: &str) -> Result<()> {
        self.status = status.to_string();
        self.draw()
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Could not restore terminal: {}", e);
        }
    }
}

fn scaled(color: Rgba, factor: f32) -> Color {
    let s = |v: u8| (v as f32 * factor) as u8;
    Color::Rgb(s(color.r), s(color.g), s(color.b))
}

fn pad_color(palette: &Palette, color: PadColor, level: LightLevel) -> Color {
    if color == PadColor::Off {
        return Color::Black;
    }
    let factor = match level {
        LightLevel::High => 1.0,
        LightLevel::Low => 0.45,
        LightLevel::Faded => 0.2,
    };
    scaled(palette.rgba(color), factor)
}

fn button_style(intensity: Intensity) -> Style {
    match intensity {
        Intensity::Off => Style::default().fg(Color::DarkGray),
        Intensity::Low => Style::default().fg(Color::Gray),
        Intensity::Medium => Style::default().fg(Color::White),
        Intensity::High => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    }
}

fn draw_surface(f: &mut Frame, lights: &Lights, status: &str, palette: &Palette) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.size());

    draw_pads(f, chunks[0], lights, palette);

    let buttons: Vec<Span> = BUTTON_LABELS
        .iter()
        .flat_map(|(button, label)| {
            [
                Span::styled(*label, button_style(lights.button(*button))),
                Span::raw("  "),
            ]
        })
        .collect();
    f.render_widget(
        Paragraph::new(Line::from(buttons)).block(Block::default().borders(Borders::ALL)),
        chunks[1],
    );

    f.render_widget(
        Paragraph::new(format!("{}   (Esc to quit)", status))
            .block(Block::default().title("beatcast").borders(Borders::ALL)),
        chunks[2],
    );
}

fn draw_pads(f: &mut Frame, area: Rect, lights: &Lights, palette: &Palette) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    // Top row on screen is the last pad row
    for (screen_row, row_area) in rows.iter().enumerate() {
        let pad_row = 3 - screen_row;
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, 4); 4])
            .split(*row_area);

        for (col, cell) in cells.iter().enumerate() {
            let Some(pad) = Pad::new(pad_row * 4 + col) else {
                continue;
            };
            let light = lights.pad(pad);
            let widget = Paragraph::new(key_label(pad).to_string())
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL))
                .style(
                    Style::default()
                        .fg(Color::White)
                        .bg(pad_color(palette, light.color, light.level)),
                );
            f.render_widget(widget, *cell);
        }
    }
}

/// Full-screen color swatch used as the frame sink of `play`
pub struct SwatchDisplay {
    terminal: Option<Term>,
    label: String,
    stop: Arc<AtomicBool>,
    input: Option<JoinHandle<()>>,
}

impl SwatchDisplay {
    /// Take over the terminal; quitting from the keyboard triggers `shutdown`
    pub fn open(label: impl Into<String>, shutdown: Shutdown) -> Result<Self> {
        let terminal = enter_terminal()?;
        let stop = Arc::new(AtomicBool::new(false));
        let input = spawn_input(Arc::clone(&stop), move |key| {
            let quit = matches!(key.code, KeyCode::Esc | KeyCode::Char('q'))
                || (key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL));
            if quit {
                debug!("Quit requested from the keyboard");
                shutdown.trigger();
            }
            !quit
        });

        Ok(Self {
            terminal: Some(terminal),
            label: label.into(),
            stop,
            input: Some(input),
        })
    }

    /// Paint the frame's color over the whole screen
    pub fn show(&mut self, frame: &RgbaFrame) -> Result<()> {
        let color = frame.pixel(0, 0).unwrap_or_default();
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };
        let label = format!("{}  {}  {}x{}", self.label, color, frame.width, frame.height);
        terminal
            .draw(|f| {
                let area = f.size();
                let widget = Paragraph::new(label.as_str())
                    .style(Style::default().fg(Color::Gray).bg(scaled(color, 1.0)));
                f.render_widget(widget, area);
            })
            .map_err(surface_err)?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.shutdown().map_err(surface_err)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(input) = self.input.take() {
            let _ = input.join();
        }
        match self.terminal.take() {
            Some(mut terminal) => leave_terminal(&mut terminal),
            None => Ok(()),
        }
    }
}

impl Drop for SwatchDisplay {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Could not restore terminal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn pads(action: KeyAction) -> Vec<(usize, PadAction)> {
        match action {
            KeyAction::Events(events) => events
                .into_iter()
                .filter_map(|e| match e {
                    SurfaceEvent::Pad(p) => Some((p.pad.index(), p.action)),
                    SurfaceEvent::Buttons(_) => None,
                })
                .collect(),
            KeyAction::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_keys_follow_pad_layout() {
        assert_eq!(pad_for_char('z').map(|(p, _)| p.index()), Some(0));
        assert_eq!(pad_for_char('v').map(|(p, _)| p.index()), Some(3));
        assert_eq!(pad_for_char('a').map(|(p, _)| p.index()), Some(4));
        assert_eq!(pad_for_char('r').map(|(p, _)| p.index()), Some(11));
        assert_eq!(pad_for_char('4').map(|(p, _)| p.index()), Some(15));
        assert_eq!(pad_for_char('Q'), Pad::new(8).map(|p| (p, true)));
        assert_eq!(pad_for_char('!'), Pad::new(12).map(|p| (p, true)));
        assert!(pad_for_char('p').is_none());
        for pad in Pad::all() {
            assert_eq!(pad_for_char(key_label(pad)).map(|(p, _)| p), Some(pad));
        }
    }

    #[test]
    fn test_plain_key_taps_pad() {
        let mut keymap = KeyMap::new();
        assert_eq!(
            pads(keymap.translate(press(KeyCode::Char('s')))),
            vec![(5, PadAction::Touched), (5, PadAction::Released)]
        );
    }

    #[test]
    fn test_shifted_key_latches_pad() {
        let mut keymap = KeyMap::new();
        let shifted = KeyEvent::new(KeyCode::Char('S'), KeyModifiers::SHIFT);
        assert_eq!(pads(keymap.translate(shifted)), vec![(5, PadAction::Touched)]);
        assert_eq!(pads(keymap.translate(shifted)), vec![(5, PadAction::Released)]);
    }

    #[test]
    fn test_function_keys_select_modes() {
        let mut keymap = KeyMap::new();
        assert_eq!(
            keymap.translate(press(KeyCode::F(2))),
            KeyAction::Events(vec![SurfaceEvent::Buttons(vec![Button::Step])])
        );
        assert_eq!(
            keymap.translate(press(KeyCode::Right)),
            KeyAction::Events(vec![SurfaceEvent::Buttons(vec![Button::ArrowRight])])
        );
        assert_eq!(keymap.translate(press(KeyCode::Esc)), KeyAction::Quit);
        assert_eq!(
            keymap.translate(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyAction::Quit
        );
    }
}
