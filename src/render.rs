// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Plain-text dashboard
//!
//! [`TextRenderer`] keeps the latest view, chart and banners and redraws the
//! whole screen whenever one of them changes.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::driver::Renderer;
use crate::error::CommandError;
use crate::event::{Command, Event};
use crate::graph::ChartFrame;
use crate::notify::{AlarmLine, AlarmUpdate, BannerSource};
use crate::registry::{DetailPopup, RxHealth};
use crate::snapshot::{EntityKind, EntityRecord};
use crate::view::{CounterRow, DashboardView, EntityRow, MemoryRow};

mod colors {
    pub(super) const RESET: &str = "\x1b[0m";
    pub(super) const BOLD: &str = "\x1b[1m";
    pub(super) const DIM: &str = "\x1b[2m";
    pub(super) const RED: &str = "\x1b[31m";
    pub(super) const YELLOW: &str = "\x1b[33m";
    pub(super) const CYAN: &str = "\x1b[36m";
}

const BOX_WIDTH: usize = 72;
const CHART_HEIGHT: usize = 8;
const CHART_WIDTH: usize = 64;

/// Writes the dashboard as text
#[derive(Debug)]
pub struct TextRenderer<W> {
    out: W,
    color: bool,
    view: Option<Arc<DashboardView>>,
    chart: Option<ChartFrame>,
    graphed: Option<String>,
    errors: [Option<String>; 2],
    alarms: Vec<AlarmLine>,
    motd: Option<String>,
    popup: Option<DetailPopup>,
    notice: Option<String>,
}

impl<W: Write> TextRenderer<W> {
    /// Render to `out`, using ANSI colors when `color` is set
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            view: None,
            chart: None,
            graphed: None,
            errors: Default::default(),
            alarms: Vec::new(),
            motd: None,
            popup: None,
            notice: None,
        }
    }

    /// The underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{}", colors::RESET)
        } else {
            text.to_string()
        }
    }

    /// The full screen for the current state
    pub fn screen(&self) -> String {
        let mut output = String::new();
        if self.color {
            output.push_str("\x1B[2J\x1B[H");
        }

        let heading = match self.view.as_ref().and_then(|view| view.server.server_id.as_deref()) {
            Some(server_id) => format!("{server_id} aprsc status"),
            None => "aprsc status".to_string(),
        };
        output.push_str(&self.paint(colors::BOLD, &heading));
        output.push_str("\n\n");

        for message in self.errors.iter().flatten() {
            output.push_str(&self.paint(colors::RED, message));
            output.push('\n');
        }
        for alarm in &self.alarms {
            output.push_str(&self.paint(colors::YELLOW, &format!("Alarm: {}", alarm.message)));
            output.push('\n');
        }
        if let Some(motd) = &self.motd {
            output.push_str(&framed("Message of the day", motd, BOX_WIDTH));
            output.push('\n');
        }

        if let Some(view) = &self.view {
            output.push_str(&server_section(view));
            output.push('\n');
            for (title, rows) in [
                ("Totals", &view.totals),
                ("Duplicate filter", &view.dupecheck),
                ("Duplicate variations", &view.dupecheck_variations),
            ] {
                if !rows.is_empty() {
                    output.push_str(&framed(title, &self.counter_table(rows), BOX_WIDTH));
                    output.push('\n');
                }
            }
            if !view.memory.is_empty() {
                output.push_str(&framed("Memory", &memory_table(&view.memory), BOX_WIDTH));
                output.push('\n');
            }
            for kind in EntityKind::ALL {
                if !view.rows(kind).is_empty() {
                    output.push_str(&self.entity_table(view, kind));
                    output.push('\n');
                }
            }
        }

        if let Some(chart) = &self.chart {
            output.push_str(&framed(&chart.label, &render_chart(chart, CHART_HEIGHT, CHART_WIDTH), BOX_WIDTH));
            output.push('\n');
        }

        if let Some(popup) = &self.popup {
            output.push_str(&framed(&popup.title, &popup.lines.join("\n"), BOX_WIDTH));
            output.push('\n');
        }
        if let Some(notice) = &self.notice {
            output.push_str(&self.paint(colors::DIM, notice));
            output.push('\n');
        }
        output
    }

    fn counter_table(&self, rows: &[CounterRow]) -> String {
        let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
        rows.iter()
            .map(|row| {
                let name = format!("{:<name_width$}", row.name);
                let name = if self.graphed.as_deref() == Some(row.key.as_str()) {
                    self.paint(colors::CYAN, &name)
                } else {
                    name
                };
                format!("{name}  {:>14}  {}", row.value, row.rate)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn entity_table(&self, view: &DashboardView, kind: EntityKind) -> String {
        let header = columns(kind);
        let mut table: Vec<Vec<String>> = vec![header.iter().map(|c| c.to_string()).collect()];
        for row in view.rows(kind) {
            if let Some(record) = view.record(kind, row) {
                table.push(cells(kind, row, record));
            }
        }

        let mut section = format!("{}\n", self.paint(colors::BOLD, &title(kind)));
        for (n, text) in grid(&table).iter().enumerate() {
            let health = (n > 0).then(|| view.rows(kind)[n - 1].rx_health);
            match health {
                Some(RxHealth::Severe) => section.push_str(&self.paint(colors::RED, text)),
                Some(RxHealth::Dropping) => section.push_str(&self.paint(colors::YELLOW, text)),
                _ => section.push_str(text),
            }
            section.push('\n');
        }
        section
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn render(&mut self, event: Event) {
        self.notice = None;
        match event {
            Event::Render(view) => self.view = Some(view),
            Event::ErrorBanner { source, message } => self.errors[source as usize] = message,
            Event::Alarms(AlarmUpdate::Show(lines) | AlarmUpdate::Update(lines)) => self.alarms = lines,
            Event::Alarms(AlarmUpdate::Hide) => self.alarms.clear(),
            Event::Motd(motd) => self.motd = motd,
            Event::Chart(frame) => self.chart = Some(frame),
            Event::GraphSelected(metric) => self.graphed = Some(metric),
            Event::Detail(popup) => self.popup = Some(popup),
        }
        self.flush();
    }

    fn command_failed(&mut self, _command: &Command, error: &CommandError) {
        self.notice = Some(error.to_string());
        self.flush();
    }
}

impl<W: Write> TextRenderer<W> {
    fn flush(&mut self) {
        let screen = self.screen();
        if let Err(error) = self.out.write_all(screen.as_bytes()).and_then(|_| self.out.flush()) {
            warn!(%error, "failed to write dashboard");
        }
    }

    /// Visible text of an error banner
    pub fn error(&self, source: BannerSource) -> Option<&str> {
        self.errors[source as usize].as_deref()
    }
}

fn title(kind: EntityKind) -> String {
    match kind {
        EntityKind::Listener => "Listening sockets",
        EntityKind::Uplink => "Uplinks",
        EntityKind::Peer => "Peers",
        EntityKind::Client => "Clients",
    }
    .to_string()
}

fn columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Listener => &[
            "id", "proto", "addr", "name", "clients", "peak", "max", "connects", "conn/s", "pkts tx", "pkts rx",
            "bytes/s",
        ],
        EntityKind::Uplink => &[
            "id", "server", "addr", "mode", "connected", "last read", "software", "pkts tx", "pkts rx", "bytes/s",
            "obuf",
        ],
        EntityKind::Peer => &["id", "server", "addr", "last read", "pkts tx", "pkts rx", "bytes/s", "obuf"],
        EntityKind::Client => &[
            "id", "port", "username", "addr", "verified", "connected", "last read", "software", "pkts tx", "pkts rx",
            "bytes/s", "obuf", "heard", "filter",
        ],
    }
}

fn cells(kind: EntityKind, row: &EntityRow, record: &EntityRecord) -> Vec<String> {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    let number = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_default();
    let since = |value: Option<i64>| value.map(format_duration).unwrap_or_default();
    let software = match (&record.app_name, &record.app_version) {
        (Some(name), Some(version)) => format!("{name} {version}"),
        (name, _) => text(name),
    };
    let mut id = row.id.to_string();
    if row.has_certificate {
        id.push('*');
    }

    match kind {
        EntityKind::Listener => vec![
            id,
            text(&record.proto),
            text(&record.addr),
            text(&record.name),
            number(record.clients),
            number(record.clients_peak),
            number(record.clients_max),
            number(record.connects),
            row.connects_rates.clone().unwrap_or_default(),
            number(record.pkts_tx),
            number(record.pkts_rx),
            row.bytes_rates.clone(),
        ],
        EntityKind::Uplink => vec![
            id,
            text(&record.username),
            text(&record.addr_rem),
            text(&record.mode),
            since(record.since_connect),
            since(record.since_last_read),
            software,
            number(record.pkts_tx),
            number(record.pkts_rx),
            row.bytes_rates.clone(),
            number(record.obuf_q),
        ],
        EntityKind::Peer => vec![
            id,
            text(&record.username),
            text(&record.addr_rem),
            since(record.since_last_read),
            number(record.pkts_tx),
            number(record.pkts_rx),
            row.bytes_rates.clone(),
            number(record.obuf_q),
        ],
        EntityKind::Client => vec![
            id,
            record.addr_loc.as_deref().map(only_port).unwrap_or_default().to_string(),
            text(&record.username),
            text(&record.addr_rem),
            record.verified.map(|v| v.to_string()).unwrap_or_default(),
            since(record.since_connect),
            since(record.since_last_read),
            software,
            number(record.pkts_tx),
            number(record.pkts_rx),
            row.bytes_rates.clone(),
            number(record.obuf_q),
            number(record.heard_count),
            text(&record.filter),
        ],
    }
}

fn server_section(view: &DashboardView) -> String {
    let server = &view.server;
    let mut lines = Vec::new();
    let mut field = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            lines.push(format!("{name:<16}{value}"));
        }
    };
    field("Server ID", server.server_id.clone());
    field("Server admin", server.admin.clone());
    field("Admin email", server.email.clone());
    field("Software", server.software.clone());
    field("Features", server.features.clone());
    field("Uptime", server.uptime.map(format_duration));
    field("Server started", server.started.map(format_timestamp));
    field("Operating system", server.os.clone());
    field("Server time", Some(format_timestamp(server.clock.time_now)));
    framed("Server", &lines.join("\n"), BOX_WIDTH)
}

/// Frame `body` in a `width` column box with `title` set into the top edge
fn framed(title: &str, body: &str, width: usize) -> String {
    let inner = width.saturating_sub(2);
    let label = format!(" {title} ");
    let rule = inner.saturating_sub(visible_width(&label) + 1);
    let mut out = format!("┌─{label}{}┐\n", "─".repeat(rule));
    for line in body.lines() {
        let pad = inner.saturating_sub(visible_width(line) + 1);
        out.push_str(&format!("│ {line}{}│\n", " ".repeat(pad)));
    }
    out.push_str(&format!("└{}┘", "─".repeat(inner)));
    out
}

/// Columns of text, left aligned and two spaces apart
fn grid(table: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = Vec::new();
    for line in table {
        widths.resize(widths.len().max(line.len()), 0);
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(visible_width(cell));
        }
    }
    table
        .iter()
        .map(|line| {
            line.iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect()
}

/// Characters a terminal shows, skipping ANSI color sequences
fn visible_width(text: &str) -> usize {
    let mut width = 0;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            chars.by_ref().find(|&c| c == 'm');
        } else {
            width += 1;
        }
    }
    width
}

fn memory_table(rows: &[MemoryRow]) -> String {
    let gauge = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    let mut table = vec![
        ["Type", "Cell size", "Cells used", "Cells free", "Bytes used", "Bytes allocated", "Blocks"]
            .map(String::from)
            .to_vec(),
    ];
    table.extend(rows.iter().map(|row| {
        vec![
            row.name.to_string(),
            gauge(row.cell_size),
            gauge(row.cells_used),
            gauge(row.cells_free),
            gauge(row.used_bytes),
            gauge(row.allocated_bytes),
            gauge(row.blocks),
        ]
    }));
    grid(&table).join("\n")
}

/// Plot the visible part of a chart as bars
fn render_chart(frame: &ChartFrame, height: usize, width: usize) -> String {
    let data: Vec<f64> = frame
        .points
        .iter()
        .filter(|(x, _)| frame.window.is_none_or(|window| window.contains(*x)))
        .map(|&(_, y)| y.max(frame.y_min))
        .collect();
    if data.is_empty() || height == 0 || width == 0 {
        return "No data".to_string();
    }

    let max = data.iter().copied().fold(f64::MIN, f64::max).max(f64::MIN_POSITIVE);
    let step = data.len().div_ceil(width);

    let mut graph = vec![vec![' '; width]; height];
    for (i, chunk) in data.chunks(step).enumerate().take(width) {
        let avg = chunk.iter().sum::<f64>() / chunk.len() as f64;
        let filled = ((avg - frame.y_min) / (max - frame.y_min) * (height - 1) as f64).round() as usize;
        for y in 0..=filled.min(height - 1) {
            graph[height - 1 - y][i] = '█';
        }
    }

    let mut output = String::new();
    for row in graph {
        output.push_str(row.iter().collect::<String>().trim_end());
        output.push('\n');
    }
    let latest = data.last().copied().unwrap_or_default();
    output.push_str(&format!("Max: {max:.2} | Latest: {latest:.2}"));
    if let Some(selection) = frame.selection {
        output.push_str(&format!(
            "\nSelected: {} - {}",
            format_timestamp((selection.from / 1000.0) as i64),
            format_timestamp((selection.to / 1000.0) as i64)
        ));
    }
    output
}

/// Format a duration in seconds with its two largest units
///
/// Days and hours stop there; otherwise minutes are added. Under a minute the
/// plain seconds are shown.
pub fn format_duration(seconds: i64) -> String {
    let mut rest = seconds;
    let mut out = String::new();
    let mut units = 0;

    if rest > 86_400 {
        out.push_str(&format!("{}d", rest / 86_400));
        rest %= 86_400;
        units += 1;
    }
    if rest > 3600 {
        out.push_str(&format!("{}h", rest / 3600));
        rest %= 3600;
        units += 1;
    }
    if units > 1 {
        return out;
    }
    if rest > 60 {
        out.push_str(&format!("{}m", rest / 60));
        units += 1;
    }
    if units > 0 {
        return out;
    }
    format!("{rest}s")
}

/// `YYYY-MM-DD HH:MM:SSz` in UTC
pub fn format_timestamp(unix: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix, 0)
        .map(|time| time.format("%Y-%m-%d %H:%M:%Sz").to_string())
        .unwrap_or_default()
}

/// Port part of an `address:port` string
pub fn only_port(addr: &str) -> &str {
    addr.rfind(':').map_or(addr, |colon| &addr[colon + 1..])
}
