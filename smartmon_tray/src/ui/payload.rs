//! Last transmitted record: decoded fields on top, the raw line underneath.

use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::types::Payload;
use crate::ui::util::{human_kb, human_uptime};

fn row(key: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{key:<10}"), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

pub fn payload_lines(p: &Payload, sent_at: Option<DateTime<Utc>>) -> Vec<Line<'static>> {
    let missing = || "n/a".to_string();
    let weather = p.weather.as_ref().map(|w| {
        let temp = w.temp.map(|t| format!("{t:.1}°C")).unwrap_or_else(missing);
        match &w.desc {
            Some(d) => format!("{temp} {d}"),
            None => temp,
        }
    });
    vec![
        row("host", p.host.clone().unwrap_or_else(missing)),
        row("uptime", p.uptime.map(human_uptime).unwrap_or_else(missing)),
        row("disk free", p.disk_free.map(human_kb).unwrap_or_else(missing)),
        row("app", p.app.clone().unwrap_or_else(missing)),
        row("weather", weather.unwrap_or_else(missing)),
        row(
            "sent at",
            sent_at
                .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(missing),
        ),
    ]
}

pub fn draw_payload(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    p: Option<&Payload>,
    raw: Option<&str>,
    sent_at: Option<DateTime<Utc>>,
) {
    let mut lines = match p {
        Some(pp) => payload_lines(pp, sent_at),
        None => vec![Line::from("waiting for the first record...")],
    };
    if let Some(r) = raw {
        lines.push(Line::from(""));
        lines.push(Line::styled(r.to_string(), Style::default().fg(Color::DarkGray)));
    }
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Last record")),
        area,
    );
}
