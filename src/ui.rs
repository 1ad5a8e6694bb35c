use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, DisplayRow};
use crate::model::{ClusterStatus, NOT_AVAILABLE, ResourceKind};
use crate::view::{ClusterResourceViewModel, Severity};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const POWERLINE_RIGHT: &str = "\u{e0b0}";
const POWERLINE_LEFT: &str = "\u{e0b2}";

pub fn render(frame: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app.view());
    let right_line = build_right_header_line(app.view());
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(view: &ClusterResourceViewModel) -> Line<'static> {
    let mut spans = Vec::new();
    let selected = view.selected_clusters();
    let title_next = if selected.is_empty() { BG } else { PL_B };
    push_powerline_segment(&mut spans, " 󰠳 skew ", Color::Black, ACCENT, title_next);

    for (idx, cluster_id) in selected.iter().enumerate() {
        let next_bg = if idx + 1 == selected.len() { BG } else { PL_B };
        let (icon, fg) = match view.cluster_status(cluster_id) {
            Some(ClusterStatus::Loading) => ("…", WARN),
            Some(ClusterStatus::Success) => ("●", ACCENT),
            Some(ClusterStatus::Error) => ("✖", ERROR),
            None => ("○", MUTED),
        };
        spans.push(Span::styled(
            format!(" {icon}"),
            Style::default().fg(fg).bg(PL_B),
        ));
        push_powerline_segment(
            &mut spans,
            format!(" {} ", view.registry().display_name(cluster_id)),
            Color::White,
            PL_B,
            next_bg,
        );
    }

    if view.demo_data() {
        spans.push(Span::styled(
            " demo data ",
            Style::default()
                .fg(Color::Black)
                .bg(WARN)
                .add_modifier(Modifier::BOLD),
        ));
    }
    Line::from(spans)
}

fn build_right_header_line(view: &ClusterResourceViewModel) -> Line<'static> {
    let label = if view.loading() {
        " loading… ".to_string()
    } else {
        match view.last_refreshed() {
            Some(at) => format!(" refreshed {} ", at.format("%H:%M:%S")),
            None => " not loaded ".to_string(),
        }
    };

    let mut spans = Vec::new();
    push_powerline_segment_rtl(&mut spans, label, Color::White, PL_C, BG);
    Line::from(spans)
}

fn render_body(frame: &mut Frame, area: Rect, app: &mut App) {
    let (error_area, table_area) = match app.view().error() {
        Some(_) => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(error_panel_height(app.view())),
                    Constraint::Min(3),
                ])
                .split(area);
            (Some(chunks[0]), chunks[1])
        }
        None => (None, area),
    };

    if let Some(error_area) = error_area {
        render_error_panel(frame, error_area, app.view());
    }
    app.set_page_size(table_rows_visible(table_area));
    render_table(frame, table_area, app);
}

fn error_panel_height(view: &ClusterResourceViewModel) -> u16 {
    let failed = view
        .selected_clusters()
        .iter()
        .filter(|cluster_id| view.cluster_error(cluster_id).is_some())
        .count();
    (3 + failed as u16).min(8)
}

fn render_error_panel(frame: &mut Frame, area: Rect, view: &ClusterResourceViewModel) {
    let Some(error) = view.error() else {
        return;
    };
    let (title, color) = match error.severity {
        Severity::Partial => ("Partial data", WARN),
        Severity::Fatal => ("Error", ERROR),
    };

    let mut lines = vec![Line::from(error.message.clone())];
    for cluster_id in view.selected_clusters() {
        if let Some(reason) = view.cluster_error(cluster_id) {
            lines.push(Line::from(Span::styled(
                format!(
                    "{}: {}",
                    view.registry().display_name(cluster_id),
                    reason
                ),
                Style::default().fg(MUTED),
            )));
        }
    }

    let panel = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(color));
    frame.render_widget(panel, area);
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let view = app.view();
    let rows = app.visible_rows();
    let headers = table_headers(view);

    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let body = rows.iter().map(|line| table_row(view, line));

    let block = Block::default()
        .title(table_title(view, rows.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    if rows.is_empty() {
        let message = if view.loading() {
            "Loading workloads…"
        } else if view.selected_clusters().is_empty() {
            "No cluster selected. Press 1-9 to pick one."
        } else {
            "No workloads match the current filters."
        };
        frame.render_widget(
            Paragraph::new(message)
                .alignment(Alignment::Center)
                .style(Style::default().fg(MUTED))
                .block(block),
            area,
        );
        return;
    }

    let table = Table::new(body, column_constraints(headers.len()))
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    state.select(Some(app.selected()));
    frame.render_stateful_widget(table, area, &mut state);
}

fn table_title(view: &ClusterResourceViewModel, count: usize) -> String {
    let mut title = format!("Workloads ({count})");
    if view.show_only_different_versions() {
        title.push_str(" · diverging only");
    }
    title
}

fn table_headers(view: &ClusterResourceViewModel) -> Vec<String> {
    let mut headers = vec![
        "NAMESPACE".to_string(),
        "KIND".to_string(),
        "NAME".to_string(),
        "STATUS".to_string(),
        "READY".to_string(),
    ];
    headers.extend(
        view.selected_clusters()
            .iter()
            .map(|cluster_id| view.registry().display_name(cluster_id).to_uppercase()),
    );
    if view.check_for_updates() {
        headers.push("LATEST".to_string());
    }
    headers
}

fn table_row<'a>(view: &ClusterResourceViewModel, line: &DisplayRow<'a>) -> Row<'a> {
    let row = line.row;
    let diverging = view.has_different_versions(row);
    let base = if diverging {
        Style::default().fg(WARN)
    } else {
        Style::default().fg(Color::White)
    };

    let mut cells = vec![
        Cell::from(row.namespace.clone()).style(Style::default().fg(MUTED)),
        Cell::from(line.kind.title()).style(Style::default().fg(MUTED)),
        Cell::from(row.name.clone()).style(base),
        Cell::from(row.status.clone()).style(status_style(&row.status)),
        Cell::from(readiness_cell(line)).style(base),
    ];

    for cluster_id in view.selected_clusters() {
        let (version, missing) = match row.cluster_versions.get(cluster_id) {
            Some(snapshot) => (snapshot.version.as_str(), snapshot.is_missing()),
            None => (NOT_AVAILABLE, true),
        };
        let style = if missing || version == NOT_AVAILABLE {
            Style::default().fg(MUTED)
        } else {
            base
        };
        cells.push(Cell::from(version.to_string()).style(style));
    }

    if view.check_for_updates() {
        let cell = match view.get_latest_version(line.kind, row) {
            Some(latest) if view.has_update_available(line.kind, row) => {
                Cell::from(format!("↑ {latest}"))
                    .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
            }
            Some(latest) => Cell::from(latest.to_string()).style(Style::default().fg(MUTED)),
            None => Cell::from("").style(Style::default().fg(MUTED)),
        };
        cells.push(cell);
    }

    Row::new(cells)
}

/// Ready column: replica counts for workloads, schedule for cron jobs.
fn readiness_cell(line: &DisplayRow<'_>) -> String {
    let row = line.row;
    match line.kind {
        ResourceKind::CronJobs => row
            .schedule
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ResourceKind::Deployments | ResourceKind::StatefulSets => match (row.ready, row.replicas) {
            (Some(ready), Some(replicas)) => format!("{ready}/{replicas}"),
            _ => NOT_AVAILABLE.to_string(),
        },
    }
}

fn status_style(status: &str) -> Style {
    match status {
        "Running" | "Active" | "Scheduled" => Style::default().fg(ACCENT),
        "Progressing" | "Suspended" | "Scaled down" => Style::default().fg(WARN),
        NOT_AVAILABLE => Style::default().fg(MUTED),
        _ => Style::default().fg(ERROR),
    }
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let view = app.view();
    let (status_bg, status_fg) = match view.error().map(|error| error.severity) {
        Some(Severity::Fatal) => (ERROR, Color::Black),
        Some(Severity::Partial) => (WARN, Color::Black),
        None => (PL_B, Color::White),
    };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " ? help ", Color::White, PL_A, status_bg);
    let status_width_hint = area.width.saturating_sub(24).min(120) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(app.status(), status_width_hint.max(24))),
        status_fg,
        status_bg,
        BG,
    );

    let right_spans = build_footer_glance_spans(view);
    let min_left = 28u16;
    let max_right = area.width.saturating_sub(min_left);
    let right_width = (spans_width(&right_spans) as u16).min(max_right);
    if right_width == 0 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(right_spans))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn build_footer_glance_spans(view: &ClusterResourceViewModel) -> Vec<Span<'static>> {
    let namespaces = filter_label(view.selected_namespaces().iter().map(String::as_str));
    let kinds = filter_label(view.selected_resource_types().iter().map(|kind| kind.short_token()));

    let mut spans = Vec::new();
    spans.push(Span::styled(
        format!("ns:{namespaces} "),
        Style::default().fg(MUTED),
    ));
    spans.push(Span::styled(
        format!("kind:{kinds} "),
        Style::default().fg(MUTED),
    ));
    spans.push(flag_span("diff", view.show_only_different_versions()));
    spans.push(flag_span("upd", view.check_for_updates()));
    if view.check_for_updates() {
        spans.push(Span::styled(
            format!("updates:{} ", view.version_updates().len()),
            Style::default().fg(ACCENT),
        ));
    }
    spans.push(Span::styled(
        format!("total:{} ", view.total_resources_count()),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    ));
    spans
}

fn flag_span(label: &str, enabled: bool) -> Span<'static> {
    if enabled {
        Span::styled(format!("{label}:on "), Style::default().fg(ACCENT))
    } else {
        Span::styled(format!("{label}:off "), Style::default().fg(MUTED))
    }
}

fn filter_label<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let values = values.collect::<Vec<_>>();
    if values.is_empty() {
        "all".to_string()
    } else {
        values.join(",")
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled(POWERLINE_RIGHT, Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(POWERLINE_LEFT, Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 64, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "skew help  clusters:{}",
            app.view().selected_clusters().len()
        )),
        Line::from(""),
    ];
    for line in help_lines(app.view()) {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_lines(view: &ClusterResourceViewModel) -> Vec<String> {
    let mut lines = vec![
        "Move: j/k  Ctrl+d/Ctrl+u page  g/G top/bottom".to_string(),
        "Filters: n cycle namespace  t cycle kind  d diverging only  x reset".to_string(),
        "Data: r refresh  u toggle update checks  q quit  Esc close".to_string(),
        String::new(),
        "Clusters:".to_string(),
    ];
    for (idx, cluster) in view.available_clusters().iter().take(9).enumerate() {
        let marker = if view.selected_clusters().contains(&cluster.id) {
            "x"
        } else {
            " "
        };
        let status = view
            .cluster_status(&cluster.id)
            .map(|status| status.label())
            .unwrap_or("idle");
        lines.push(format!("  {} [{marker}] {} ({status})", idx + 1, cluster.name));
    }
    lines
}

fn table_rows_visible(area: Rect) -> usize {
    area.height.saturating_sub(3).max(1) as usize
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Fixed widths for the descriptive columns, the rest shared by version columns.
fn column_constraints(columns: usize) -> Vec<Constraint> {
    const LEADING: [u16; 5] = [14, 12, 24, 12, 8];
    let mut constraints = LEADING
        .iter()
        .take(columns)
        .map(|width| Constraint::Length(*width))
        .collect::<Vec<_>>();
    let remaining = columns.saturating_sub(LEADING.len());
    if remaining > 0 {
        let share = (100 / remaining as u16).max(1);
        constraints.extend((0..remaining).map(|_| Constraint::Percentage(share)));
    }
    constraints
}

#[cfg(test)]
mod tests {
    use super::{
        BG, PL_B, POWERLINE_LEFT, POWERLINE_RIGHT, column_constraints, compact_text,
        filter_label, push_powerline_segment, push_powerline_segment_rtl, readiness_cell,
        spans_width,
    };
    use crate::app::DisplayRow;
    use crate::model::{GroupedRow, ResourceKind};
    use ratatui::layout::Constraint;
    use ratatui::style::Color;

    #[test]
    fn powerline_segments_carry_separator_glyphs() {
        let mut spans = Vec::new();
        push_powerline_segment(&mut spans, " skew ", Color::White, PL_B, BG);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].content, POWERLINE_RIGHT);
        assert_eq!(spans[1].content, "\u{e0b0}");

        let mut spans = Vec::new();
        push_powerline_segment_rtl(&mut spans, " 12:00 ", Color::White, PL_B, BG);
        assert_eq!(spans[0].content, POWERLINE_LEFT);
        assert_eq!(spans[0].content, "\u{e0b2}");
        assert_eq!(spans_width(&spans), 8);
    }

    #[test]
    fn compact_text_truncates_with_ellipsis() {
        assert_eq!(compact_text("checkout", 20), "checkout");
        assert_eq!(compact_text("checkout-service", 6), "check…");
    }

    #[test]
    fn version_columns_share_remaining_width() {
        let constraints = column_constraints(7);
        assert_eq!(constraints.len(), 7);
        assert_eq!(constraints[5], Constraint::Percentage(50));
        assert_eq!(column_constraints(2).len(), 2);
    }

    #[test]
    fn readiness_depends_on_kind() {
        let row = GroupedRow {
            ready: Some(2),
            replicas: Some(3),
            schedule: Some("*/5 * * * *".to_string()),
            ..GroupedRow::default()
        };

        let workload = DisplayRow {
            kind: ResourceKind::Deployments,
            row: &row,
        };
        assert_eq!(readiness_cell(&workload), "2/3");

        let cron = DisplayRow {
            kind: ResourceKind::CronJobs,
            row: &row,
        };
        assert_eq!(readiness_cell(&cron), "*/5 * * * *");
    }

    #[test]
    fn empty_filters_read_as_all() {
        assert_eq!(filter_label(std::iter::empty()), "all");
        assert_eq!(filter_label(["dev", "prod"].into_iter()), "dev,prod");
    }
}
