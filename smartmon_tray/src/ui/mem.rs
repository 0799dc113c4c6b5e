//! Memory gauge.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Gauge},
};

use crate::types::Payload;
use crate::ui::util::human_kb;

pub fn draw_mem(f: &mut ratatui::Frame<'_>, area: Rect, p: Option<&Payload>) {
    let (used, total) = p.map(|pp| (pp.ram_used, pp.ram)).unwrap_or((0, 0));
    let pct = if total > 0 {
        (used as f64 / total as f64 * 100.0).min(100.0) as u16
    } else {
        0
    };

    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(Color::Magenta))
        .percent(pct)
        .label(format!("{} / {}", human_kb(used), human_kb(total)));
    f.render_widget(g, area);
}
