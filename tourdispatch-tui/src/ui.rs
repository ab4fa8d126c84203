use chrono::Local;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
};
use tokio::time::Instant;
use tourdispatch_core::{
    DispatchState, MarkerSet, NoticeKind, TourView,
    geometry::{self, PathSource},
    model::{Category, StopStatus},
    state::AssignmentPhase,
};

use crate::app::App;

const KEY_HINTS: &str = "1-4 types · +/- threshold · p plan · a assign all · s assign · d discard · x discard unassigned · t terminate · ↑/↓ tour · ←/→ stop · Esc close · q quit";

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let state = app.snapshot();
    let fleet = app.fleet();
    let area = frame.area();

    // Outer layout: planning form, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    draw_planning_form(frame, app, &state, *header_area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(*content_area);
    let [left_area, right_area] = columns.as_ref() else {
        return;
    };

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(9),
            Constraint::Length(8),
        ])
        .split(*right_area);
    let [stops_area, details_area, fleet_area] = right.as_ref() else {
        return;
    };

    if state.tours().is_empty() {
        draw_baseline(frame, &state, *left_area);
    } else {
        draw_tours(frame, &state, *left_area);
    }
    draw_stops(frame, app, &state, *stops_area);
    draw_details(frame, &state, *details_area);
    draw_fleet(frame, &fleet, *fleet_area);
    draw_status(frame, &state, *status_area);
}

fn draw_planning_form(frame: &mut Frame<'_>, app: &App, state: &DispatchState, area: Rect) {
    let mut spans: Vec<Span<'_>> = Vec::new();
    for (slot, category) in Category::ALL.iter().enumerate() {
        let checked = if app.categories.contains(category) {
            "x"
        } else {
            " "
        };
        spans.push(Span::styled(
            format!("[{checked}] {} {}  ", slot + 1, category.label()),
            Style::default().fg(category_color(*category)),
        ));
    }
    spans.push(Span::raw(format!("· threshold {}", app.threshold)));
    if state.has_active_plan() {
        spans.push(Span::styled(
            " · plan active",
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("tourdispatch · plan collection tours"),
    );
    frame.render_widget(header, area);
}

fn draw_baseline(frame: &mut Frame<'_>, state: &DispatchState, area: Rect) {
    let points = state.map_points();
    let active = points.iter().filter(|point| point.active).count();
    let depot = state
        .depot()
        .map_or("<depot unavailable>", |depot| depot.name.as_str());

    let text = if state.is_loading() {
        "Loading…".to_owned()
    } else {
        format!(
            "No active plan.\n\nDepot: {depot}\nCollection points: {} ({active} active)\n\nPick waste types and press p to plan.",
            points.len()
        )
    };

    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Tours"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn draw_tours(frame: &mut Frame<'_>, state: &DispatchState, area: Rect) {
    let rows = state.tours().iter().enumerate().map(|(index, view)| {
        let category = view.tour.category;
        Row::new(vec![
            Cell::from(format!("{}", index + 1)),
            Cell::from(category.label()),
            Cell::from(format!("{}", view.stops.len())),
            Cell::from(format!("{:.1}", view.tour.planned_km)),
            Cell::from(format!("{:.1}", view.tour.planned_co2)),
            Cell::from(phase_label(view.phase)),
        ])
        .style(Style::default().fg(category_color(category)))
    });

    let column_widths = [
        Constraint::Length(4),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Min(10),
    ];

    let title = if state.is_bulk_assigning() {
        "Tours (assigning crews…)"
    } else {
        "Tours (↑/↓)"
    };

    let table = Table::new(rows, column_widths)
        .header(
            Row::new(vec!["#", "Type", "Stops", "km", "CO2 kg", "Crew"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .column_spacing(1);

    let mut table_state = TableState::default();
    table_state.select(state.active_index());
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn draw_stops(frame: &mut Frame<'_>, app: &App, state: &DispatchState, area: Rect) {
    let Some(view) = state.active_tour() else {
        let paragraph = Paragraph::new("No tour focused.")
            .block(Block::default().borders(Borders::ALL).title("Stops"));
        frame.render_widget(paragraph, area);
        return;
    };

    let selected = state.selected_stop().map(|stop| &stop.collection_point.id);
    let items = view
        .stops
        .iter()
        .map(|stop| {
            let marker = if Some(&stop.collection_point.id) == selected {
                "●"
            } else {
                " "
            };
            ListItem::new(format!(
                "{marker} {:>2}. {} · {:.0}% · {}",
                stop.stop.order,
                stop.collection_point.address,
                stop.stop.predicted_fill_pct,
                stop_status_label(stop.stop.status)
            ))
        })
        .collect::<Vec<ListItem<'_>>>();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Stops of {} (←/→, Esc)", view.tour.id)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut list_state = ListState::default();
    if !view.stops.is_empty() {
        list_state.select(Some(app.stop_cursor.min(view.stops.len() - 1)));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_details(frame: &mut Frame<'_>, state: &DispatchState, area: Rect) {
    let lines = state
        .active_tour()
        .map_or_else(Vec::new, |view| detail_lines(state, view));

    let paragraph = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("Details"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn detail_lines(state: &DispatchState, view: &TourView) -> Vec<String> {
    let mut lines = Vec::new();

    if view.crew.is_empty() {
        lines.push("Crew: none".to_owned());
    }
    for member in &view.crew {
        lines.push(format!("{}: {}", member.role, member.full_name));
    }
    match &view.vehicle {
        Some(vehicle) => lines.push(format!(
            "Vehicle: {} ({:.0} L)",
            vehicle.plate_number, vehicle.capacity_volume_l
        )),
        None => lines.push("Vehicle: none".to_owned()),
    }
    if let Some(started) = view.tour.started_at {
        lines.push(format!(
            "Started: {}",
            started.with_timezone(&Local).format("%d.%m.%Y %H:%M")
        ));
    }

    let depot = state.depot().and_then(|depot| depot.location);
    let path = geometry::route_path(view, depot);
    let source = match path.source {
        PathSource::Encoded => "road geometry",
        PathSource::StraightLine => "straight lines",
    };
    lines.push(format!("Route: {} points ({source})", path.points.len()));

    if let Some(stop) = state.selected_stop() {
        let point = &stop.collection_point;
        lines.push(format!(
            "Stop: {} · {} bins · {}",
            point.address,
            point.bins.len(),
            if point.active { "active" } else { "inactive" }
        ));
        if let Some(note) = stop.stop.note.as_deref().filter(|note| !note.is_empty()) {
            lines.push(format!("Note: {note}"));
        }
    }
    lines
}

fn draw_fleet(frame: &mut Frame<'_>, fleet: &MarkerSet, area: Rect) {
    let rows = fleet.iter().map(|marker| {
        Row::new(vec![
            Cell::from(marker.plate_number.clone()),
            Cell::from(marker.status.to_string()),
            Cell::from(format!(
                "{:.5}, {:.5}",
                marker.position.lat, marker.position.lon
            )),
        ])
    });

    let column_widths = [
        Constraint::Length(14),
        Constraint::Length(12),
        Constraint::Min(20),
    ];

    let table = Table::new(rows, column_widths)
        .header(
            Row::new(vec!["Plate", "Status", "Position"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Fleet ({} tracked)", fleet.len())),
        )
        .column_spacing(1);

    frame.render_widget(table, area);
}

fn draw_status(frame: &mut Frame<'_>, state: &DispatchState, area: Rect) {
    let notice = state.notice_at(Instant::now());

    let status_text = if state.is_loading() {
        format!("Working… · {KEY_HINTS}")
    } else if let Some(notice) = notice {
        format!("{} · {KEY_HINTS}", notice.message)
    } else {
        KEY_HINTS.to_owned()
    };

    let status_style = match notice.map(|notice| notice.kind) {
        Some(NoticeKind::Error) => Style::default().fg(Color::Red),
        Some(NoticeKind::Success) => Style::default().fg(Color::Green),
        None if state.is_loading() => Style::default().fg(Color::Yellow),
        None => Style::default(),
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, area);
}

fn phase_label(phase: AssignmentPhase) -> &'static str {
    match phase {
        AssignmentPhase::Unassigned => "unassigned",
        AssignmentPhase::Assigning => "assigning…",
        AssignmentPhase::Assigned => "assigned",
        AssignmentPhase::AssignFailed => "failed, retry",
    }
}

fn stop_status_label(status: StopStatus) -> &'static str {
    match status {
        StopStatus::Pending => "pending",
        StopStatus::Done => "done",
        StopStatus::Skipped => "skipped",
        StopStatus::Unknown => "unknown",
    }
}

fn category_color(category: Category) -> Color {
    category.route_color().parse().unwrap_or(Color::White)
}
