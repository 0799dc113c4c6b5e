//! App state and main loop: the bridge runs on a blocking thread, this loop
//! handles keys, pulls status snapshots and draws.

use std::{io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::Color,
    Terminal,
};
use smartmon_bridge::{
    config::Settings,
    logging::Verbosity,
    state::{BridgeStatus, StatusBoard, StopSignal},
};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::history::RecordHistory;
use crate::types::Payload;
use crate::ui::{
    cpu::draw_cpu_graph, header::draw_header, mem::draw_mem, net::draw_net_spark,
    payload::draw_payload,
};

const HISTORY_CAP: usize = 600;
const UI_TICK: Duration = Duration::from_millis(250);

pub type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Raw mode plus alternate screen. Any failure here means no status bar.
pub fn setup_terminal() -> io::Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e);
    }
    let mut terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
        Ok(t) => t,
        Err(e) => {
            restore_terminal_raw();
            return Err(e);
        }
    };
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal_raw() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

pub fn restore_terminal(terminal: &mut Tui) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

pub struct App {
    status: StatusBoard,
    verbosity: Option<Verbosity>,
    snapshot: BridgeStatus,
    payload: Option<Payload>,
    history: RecordHistory,
    seen_samples: u64,
    should_quit: bool,
}

impl App {
    pub fn new(status: StatusBoard, verbosity: Option<Verbosity>) -> Self {
        Self {
            status,
            verbosity,
            snapshot: BridgeStatus::default(),
            payload: None,
            history: RecordHistory::new(HISTORY_CAP),
            seen_samples: 0,
            should_quit: false,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbosity.as_ref().is_some_and(Verbosity::is_enabled)
    }

    /// Starts the bridge, runs the UI until quit, then stops the bridge and
    /// waits for it to close the port.
    pub async fn run(&mut self, terminal: &mut Tui, settings: Settings) -> anyhow::Result<()> {
        let stop = StopSignal::new();
        let bridge = {
            let stop = stop.clone();
            let status = self.status.clone();
            tokio::task::spawn_blocking(move || {
                smartmon_bridge::run_bridge(&settings, status, &stop)
            })
        };

        let res = self.event_loop(terminal, || bridge.is_finished()).await;

        stop.request();
        if let Err(e) = bridge.await {
            warn!("sampler thread ended abnormally: {e}");
        }
        res
    }

    async fn event_loop<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        bridge_done: impl Fn() -> bool,
    ) -> anyhow::Result<()> {
        loop {
            while event::poll(Duration::from_millis(10))? {
                if let Event::Key(k) = event::read()? {
                    self.handle_key(k);
                }
            }
            if self.should_quit {
                break;
            }
            if bridge_done() {
                warn!("sampler stopped on its own, leaving");
                break;
            }

            self.observe(self.status.snapshot());
            terminal.draw(|f| self.draw(f))?;

            sleep(UI_TICK).await;
        }
        Ok(())
    }

    pub fn handle_key(&mut self, k: KeyEvent) {
        if k.kind != KeyEventKind::Press {
            return;
        }
        match k.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Char('v') | KeyCode::Char('V') => {
                if let Some(v) = &self.verbosity {
                    match v.toggle() {
                        Ok(on) => info!("verbose logging {}", if on { "on" } else { "off" }),
                        Err(e) => warn!("could not switch verbosity: {e}"),
                    }
                }
            }
            _ => {}
        }
    }

    /// Takes a fresh snapshot; a new record (by sent counter) feeds the history.
    pub fn observe(&mut self, snap: BridgeStatus) {
        if snap.samples_sent != self.seen_samples {
            self.seen_samples = snap.samples_sent;
            if let Some(p) = snap.last_line.as_deref().and_then(Payload::parse) {
                self.history
                    .push(p.cpu, p.net.map(|n| n.rx), p.net.map(|n| n.tx));
                self.payload = Some(p);
            }
        }
        self.snapshot = snap;
    }

    pub fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2), // status bar
                Constraint::Length(3), // memory
                Constraint::Min(6),    // cpu + net | payload
            ])
            .split(f.area());

        draw_header(f, rows[0], &self.snapshot, self.verbose());
        draw_mem(f, rows[1], self.payload.as_ref());

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(rows[2]);
        let graphs = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(4),
                Constraint::Length(4),
            ])
            .split(cols[0]);

        draw_cpu_graph(f, graphs[0], &self.history.cpu, self.payload.as_ref());
        draw_net_spark(f, graphs[1], "Download", &self.history.rx, Color::Green);
        draw_net_spark(f, graphs[2], "Upload", &self.history.tx, Color::Blue);
        draw_payload(
            f,
            cols[1],
            self.payload.as_ref(),
            self.snapshot.last_line.as_deref(),
            self.snapshot.last_sent_at,
        );
    }
}
