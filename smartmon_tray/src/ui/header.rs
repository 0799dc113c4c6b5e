//! One-line status bar: link state, device, counters and key hints.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use smartmon_bridge::state::{BridgeStatus, LinkState};

use crate::ui::util::truncate_middle;

fn link_color(link: LinkState) -> Color {
    match link {
        LinkState::Connected => Color::Green,
        LinkState::Connecting => Color::Yellow,
        LinkState::Disconnected => Color::Red,
    }
}

pub fn status_line(s: &BridgeStatus, verbose: bool) -> Line<'static> {
    let device = s
        .device
        .as_deref()
        .map(|d| truncate_middle(d, 28))
        .unwrap_or_else(|| "no device".into());
    Line::from(vec![
        Span::styled("smartmon ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled("● ", Style::default().fg(link_color(s.link))),
        Span::raw(format!("{} | {device}", s.link.label())),
        Span::raw(format!(
            " | sent {} | failed {} | verbose {}",
            s.samples_sent,
            s.send_failures,
            if verbose { "on" } else { "off" }
        )),
        Span::styled(
            "  (v: verbose, q: quit)",
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

pub fn draw_header(f: &mut ratatui::Frame<'_>, area: Rect, s: &BridgeStatus, verbose: bool) {
    f.render_widget(
        Paragraph::new(status_line(s, verbose)).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}
