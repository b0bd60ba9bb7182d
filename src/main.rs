mod app;
mod config;
mod device;
mod logging;
mod pattern;
mod session;
mod state;
mod sync;
mod ui;
mod worker;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use config::{Cli, Config, Mode, Switch};
use crossterm::{
    event::{
        self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use device::{Command, Device, HttpDevice, RetryPolicy, Retrying};
use log::info;
use ratatui::{backend::CrosstermBackend, Terminal};
use session::Session;
use state::{MAX_TEMPO, MIN_TEMPO};
use std::{
    io,
    time::{Duration, Instant},
};
use worker::Worker;

const FRAME: Duration = Duration::from_millis(16);
const JOB_QUEUE: usize = 64;

fn main() -> Result<()> {
    let config = Config::load(Cli::parse())?;
    match config.mode.clone() {
        Mode::Panel => panel(&config),
        Mode::Status => {
            logging::init_stderr_logger();
            let status = open_device(&config).fetch_status().context("fetching /status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Mode::Wifi { state } => {
            logging::init_stderr_logger();
            let mut device = open_device(&config);
            if let Some(state) = state {
                device.send(&Command::Wifi(state == Switch::On)).context("switching WiFi")?;
            }
            let wifi = device.fetch_wifi().context("querying /wifi")?;
            println!("{}", serde_json::to_string_pretty(&wifi)?);
            Ok(())
        }
        Mode::Tempo { bpm } => {
            logging::init_stderr_logger();
            let bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO);
            open_device(&config).send(&Command::TempoSet(bpm)).context("setting tempo")?;
            println!("{}", bpm);
            Ok(())
        }
    }
}

fn open_device(config: &Config) -> Box<dyn Device> {
    let http = HttpDevice::new(&config.host, config.timeout);
    if config.retries > 0 {
        Box::new(Retrying::new(http, RetryPolicy::new(config.retries)))
    } else {
        Box::new(http)
    }
}

fn panel(config: &Config) -> Result<()> {
    logging::init_logger(&config.log_file)?;
    info!(
        "panel starting: host {} interval {:?} tracks {} retries {}",
        config.host, config.interval, config.tracks, config.retries
    );

    let worker = Worker::spawn(open_device(config), JOB_QUEUE);
    let session = Session::new(worker, config.tracks, config.interval);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let result = run(&mut terminal, App::new(session, Instant::now()));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    if let Err(e) = &result {
        log::error!("panel exited with error: {:?}", e);
    }
    info!("panel closed");
    result
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App<Worker>) -> Result<()> {
    loop {
        app.tick(Instant::now());
        terminal.draw(|f| ui::draw(f, &app))?;

        // wake early when a status fetch falls due
        let wait = app.session.next_deadline()
            .map(|due| due.saturating_duration_since(Instant::now()).min(FRAME))
            .unwrap_or(FRAME);
        if event::poll(wait)? {
            match event::read()? {
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    let now = Instant::now();

                    // copy-target prompt takes every key while open
                    if app.copy_target.is_some() {
                        match key.code {
                            KeyCode::Esc       => app.cancel_copy(),
                            KeyCode::Enter     => app.commit_copy(),
                            KeyCode::Backspace => app.copy_prompt_pop(),
                            KeyCode::Char(c)   => app.copy_prompt_push(c),
                            _ => {}
                        }
                        continue;
                    }

                    match key.code {
                        KeyCode::Esc => app.quit(),
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit(),

                        // ── Grid ──────────────────────────────────────────
                        KeyCode::Up        => app.cursor_up(),
                        KeyCode::Down      => app.cursor_down(),
                        KeyCode::Left      => app.cursor_left(),
                        KeyCode::Right     => app.cursor_right(),
                        KeyCode::Char(' ') => app.toggle_step(),
                        KeyCode::Char('c') => app.clear_track(),
                        KeyCode::Char('C') => app.clear_pattern(),
                        KeyCode::Char('m') => app.toggle_mute(),

                        // ── Transport & mixer ─────────────────────────────
                        KeyCode::Enter     => app.toggle_play(),
                        KeyCode::Char('q') => app.tempo_up(),
                        KeyCode::Char('a') => app.tempo_down(),
                        KeyCode::Char('w') => app.volume_up(),
                        KeyCode::Char('s') => app.volume_down(),

                        // ── Patterns, kits, themes ────────────────────────
                        KeyCode::Char('[') => app.pattern_prev(),
                        KeyCode::Char(']') => app.pattern_next(),
                        KeyCode::Char('y') => app.open_copy_prompt(),
                        KeyCode::Char('k') => app.kit_next(),
                        KeyCode::Char('t') => app.theme_next(),

                        // ── Pads ──────────────────────────────────────────
                        KeyCode::Char(c @ '1'..='8') => app.trigger_pad(c as usize - '1' as usize, now),
                        KeyCode::Char('l') => app.toggle_pad_loop(),
                        KeyCode::Char('h') => app.toggle_pad_hold(),
                        KeyCode::Char('r') => app.toggle_pad_record(),

                        KeyCode::Char('p') => app.toggle_hold(now),
                        _ => {}
                    }
                }
                Event::FocusLost   => app.focus_lost(),
                Event::FocusGained => app.focus_gained(Instant::now()),
                _ => {}
            }
        }
        if app.should_quit { break; }
    }
    Ok(())
}
