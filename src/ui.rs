use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, PADS};
use crate::pattern::{MAX_PATTERNS, MAX_STEPS};
use crate::state::{track_name, MAX_VOLUME};
use crate::sync::LoopState;
use crate::worker::Dispatch;

// ── Theme palettes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    accent: Color,
    hit:    Color,
    cursor: Color,
}

/// One palette per device theme, in `THEME_NAMES` order.
fn palette(theme: usize) -> Palette {
    match theme {
        1 => Palette { accent: Color::Blue,    hit: Color::LightBlue,    cursor: Color::Yellow },
        2 => Palette { accent: Color::Magenta, hit: Color::LightCyan,    cursor: Color::LightGreen },
        3 => Palette { accent: Color::Green,   hit: Color::LightGreen,   cursor: Color::Yellow },
        _ => Palette { accent: Color::Red,     hit: Color::LightRed,     cursor: Color::Yellow },
    }
}

fn track_color(track: usize) -> Color {
    const COLORS: [Color; 8] = [
        Color::Red, Color::Yellow, Color::Cyan, Color::Blue,
        Color::Magenta, Color::Green, Color::LightGreen, Color::LightCyan,
    ];
    COLORS[track % COLORS.len()]
}

// ── Top-level layout ──────────────────────────────────────────────────────────

pub fn draw<X: Dispatch>(f: &mut Frame, app: &App<X>) {
    let pal = palette(app.state().theme);
    let tracks = app.session.tracks();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                  // title bar  chunks[0]
            Constraint::Length(tracks as u16 + 4),  // step grid  chunks[1]
            Constraint::Length(3),                  // patterns   chunks[2]
            Constraint::Length(3),                  // pads       chunks[3]
            Constraint::Length(4),                  // status     chunks[4]
            Constraint::Min(0),                     // help       chunks[5]
        ])
        .split(f.area());

    draw_title(f, chunks[0], app, pal);
    draw_grid(f, chunks[1], app, pal);
    draw_patterns(f, chunks[2], app, pal);
    draw_pads(f, chunks[3], app, pal);
    draw_status(f, chunks[4], app);
    draw_help(f, chunks[5]);
}

// ── Title bar ─────────────────────────────────────────────────────────────────

fn draw_title<X: Dispatch>(f: &mut Frame, area: Rect, app: &App<X>, pal: Palette) {
    let (led, led_color) = match app.session.connected() {
        Some(true)  => ("● ONLINE", Color::Green),
        Some(false) => ("● OFFLINE", Color::Red),
        None        => ("○ ...", Color::DarkGray),
    };
    let sync = match app.session.sync().state() {
        LoopState::Active => "sync",
        LoopState::Paused => "sync paused",
    };
    let clients = match app.state().clients {
        Some(n) => format!("  ─  {} client{}", n, if n == 1 { "" } else { "s" }),
        None    => String::new(),
    };

    let line = Line::from(vec![
        Span::styled("RED808 REMOTE", Style::default().fg(pal.accent).add_modifier(Modifier::BOLD)),
        Span::raw("  ─  "),
        Span::styled(led, Style::default().fg(led_color).add_modifier(Modifier::BOLD)),
        Span::styled(format!("  ({}){}", sync, clients), Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(
        Paragraph::new(line)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(pal.accent))),
        area,
    );
}

// ── Step grid ─────────────────────────────────────────────────────────────────

fn draw_grid<X: Dispatch>(f: &mut Frame, area: Rect, app: &App<X>, pal: Palette) {
    let state = app.state();
    let title = format!(" Pattern {} — [↑↓←→] Cursor  [Space] Toggle  [c/C] Clear  [m] Mute ", state.pattern + 1);

    let mut lines: Vec<Line> = Vec::new();

    let (status_str, status_color) =
        if state.playing { ("▶ PLAYING", Color::Green) } else { ("■ STOPPED", Color::DarkGray) };
    lines.push(Line::from(vec![
        Span::styled("BPM: ", Style::default().fg(Color::DarkGray)),
        Span::styled(state.tempo.to_string(), Style::default().fg(pal.accent).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled("Kit: ", Style::default().fg(Color::DarkGray)),
        Span::styled(state.kit_label().to_string(), Style::default().fg(pal.accent).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(status_str, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
    ]));

    {
        let mut s = vec![Span::raw("           ")];
        for i in 0..MAX_STEPS {
            let is_ph = state.playing && i == state.step;
            let label = if i % 4 == 0 { format!("{:>2}", i + 1) } else { " .".to_string() };
            let sty = if is_ph { Style::default().fg(Color::Green).add_modifier(Modifier::BOLD) }
                      else     { Style::default().fg(Color::DarkGray) };
            if i > 0 && i % 4 == 0 {
                s.push(Span::raw(" "));
            }
            s.push(Span::styled(label, sty));
        }
        lines.push(Line::from(s));
    }

    let Some(grid) = app.session.bank().pattern(state.pattern) else { return };
    for (ti, steps) in grid.iter().enumerate() {
        let is_selected = ti == app.cursor_track;
        let muted = app.muted.contains(&ti);
        let color = track_color(ti);

        let name_style = match (is_selected, muted) {
            (true, false) => Style::default().fg(color).add_modifier(Modifier::BOLD),
            (true, true)  => Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
            (false, true) => Style::default().fg(Color::DarkGray),
            (false, false) => Style::default().fg(color),
        };
        let mut row: Vec<Span> = vec![
            Span::styled(format!(" {:8}", track_name(ti)), name_style),
            Span::styled(if muted { "M" } else { "·" }, Style::default().fg(Color::DarkGray)),
            Span::styled("│", Style::default().fg(Color::DarkGray)),
        ];

        for (i, &on) in steps.iter().enumerate() {
            let is_ph = state.playing && i == state.step;
            let is_cu = is_selected && i == app.cursor_step;
            let sty = if is_ph && is_cu {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else if is_ph {
                Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
            } else if is_cu {
                Style::default().fg(Color::Black).bg(pal.cursor)
            } else if on && !muted {
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            if i > 0 && i % 4 == 0 {
                row.push(Span::styled("┆", Style::default().fg(Color::DarkGray)));
            }
            row.push(Span::styled(if on { "█ " } else { "· " }, sty));
        }
        lines.push(Line::from(row));
    }

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default().title(title).borders(Borders::ALL).border_style(Style::default().fg(pal.accent)),
        ),
        area,
    );
}

// ── Pattern selector ──────────────────────────────────────────────────────────

fn draw_patterns<X: Dispatch>(f: &mut Frame, area: Rect, app: &App<X>, pal: Palette) {
    let current = app.state().pattern;
    let mut spans = Vec::with_capacity(MAX_PATTERNS);
    for i in 0..MAX_PATTERNS {
        let sty = if i == current {
            Style::default().fg(Color::Black).bg(pal.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {:>2} ", i + 1), sty));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans)).block(
            Block::default().title(" Patterns — [[ ]] Prev/Next  [y] Copy to... ").borders(Borders::ALL),
        ),
        area,
    );
}

// ── Live pads ─────────────────────────────────────────────────────────────────

fn draw_pads<X: Dispatch>(f: &mut Frame, area: Rect, app: &App<X>, pal: Palette) {
    let mut spans = Vec::new();
    for pad in 0..PADS.min(app.session.tracks()) {
        let sty = if app.pad_lit(pad) {
            Style::default().fg(Color::Black).bg(pal.hit).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(track_color(pad))
        };
        spans.push(Span::styled(format!(" {} {:7}", pad + 1, track_name(pad)), sty));
    }

    let mode = |on: bool, label: &'static str| {
        if on { Span::styled(label, Style::default().fg(pal.accent).add_modifier(Modifier::BOLD)) }
        else  { Span::styled(label, Style::default().fg(Color::DarkGray)) }
    };
    spans.push(Span::raw("│ "));
    spans.push(mode(app.pads.looping, "LOOP "));
    spans.push(mode(app.pads.hold, "HOLD "));
    spans.push(mode(app.pads.record, "REC"));

    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().title(" Pads ").borders(Borders::ALL)),
        area,
    );
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn volume_bar(volume: u8) -> String {
    let filled = volume.min(MAX_VOLUME) as usize * 10 / MAX_VOLUME as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

fn draw_status<X: Dispatch>(f: &mut Frame, area: Rect, app: &App<X>) {
    let state = app.state();
    let extra = match &app.copy_target {
        Some(buf) => format!("  │  Copy pattern {} to (1-16, Enter/Esc): {}_", state.pattern + 1, buf),
        None if app.view.status_msg.is_empty() => String::new(),
        None => format!("  │  {}", app.view.status_msg),
    };

    let text = vec![
        Line::from(vec![
            Span::styled("Vol: ", Style::default().fg(Color::DarkGray)),
            Span::styled(volume_bar(state.volume), Style::default().fg(Color::Magenta)),
            Span::styled(format!(" {:>2}", state.volume), Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)),
            Span::raw("  │  "),
            Span::styled("Track: ", Style::default().fg(Color::DarkGray)),
            Span::styled(track_name(state.track), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw("  │  "),
            Span::styled("Theme: ", Style::default().fg(Color::DarkGray)),
            Span::styled(state.theme_label(), Style::default().fg(Color::Cyan)),
            Span::styled(extra, Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("Step: ", Style::default().fg(Color::DarkGray)),
            Span::styled(format!("{:>2}/{}", state.step + 1, MAX_STEPS), Style::default().fg(Color::Green)),
        ]),
    ];

    f.render_widget(
        Paragraph::new(text)
            .block(Block::default().title(" Status ").borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        area,
    );
}

// ── Help ──────────────────────────────────────────────────────────────────────

fn draw_help(f: &mut Frame, area: Rect) {
    let w = Style::default().fg(Color::White);

    let transport = Line::from(vec![
        Span::styled("[Enter] ", w), Span::raw("Play/Stop  │  "),
        Span::styled("[q/a] ",   w), Span::raw("Tempo ±5  │  "),
        Span::styled("[w/s] ",   w), Span::raw("Volume ±1  │  "),
        Span::styled("[k] ",     w), Span::raw("Kit  │  "),
        Span::styled("[t] ",     w), Span::raw("Theme  │  "),
        Span::styled("[Esc] ",   w), Span::raw("Quit"),
    ]);
    let pads = Line::from(vec![
        Span::styled("[1-8] ", w), Span::raw("Trigger pad  │  "),
        Span::styled("[l] ",   w), Span::raw("Loop  │  "),
        Span::styled("[h] ",   w), Span::raw("Hold  │  "),
        Span::styled("[r] ",   w), Span::raw("Record  │  "),
        Span::styled("[p] ",   w), Span::raw("Pause/resume sync"),
    ]);

    f.render_widget(
        Paragraph::new(vec![transport, pads])
            .block(Block::default().title(" Help ").borders(Borders::ALL))
            .style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_theme_has_its_own_accent() {
        let accents: Vec<Color> = (0..4).map(|t| palette(t).accent).collect();
        for (i, a) in accents.iter().enumerate() {
            assert!(!accents[i + 1..].contains(a));
        }
        assert_eq!(palette(99), palette(0));
    }

    #[test]
    fn volume_bar_scales_to_ten_cells() {
        assert_eq!(volume_bar(0), "░".repeat(10));
        assert_eq!(volume_bar(15), format!("{}{}", "█".repeat(5), "░".repeat(5)));
        assert_eq!(volume_bar(30), "█".repeat(10));
    }
}
