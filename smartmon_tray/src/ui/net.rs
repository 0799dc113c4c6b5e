//! Throughput sparkline; one per direction.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Sparkline},
};
use std::collections::VecDeque;

pub fn draw_net_spark(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    label: &str,
    hist: &VecDeque<u64>,
    color: Color,
) {
    let now = hist.back().copied().unwrap_or(0);
    let peak = hist.iter().copied().max().unwrap_or(0);
    let title = format!("{label} (KB/s) now: {now} | peak: {peak}");

    let max_points = area.width.saturating_sub(2) as usize;
    let start = hist.len().saturating_sub(max_points);
    let data: Vec<u64> = hist.iter().skip(start).copied().collect();

    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .data(&data)
        .style(Style::default().fg(color));
    f.render_widget(spark, area);
}
