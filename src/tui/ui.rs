//! UI rendering for the TUI

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

use super::app::{App, Pane, SettingsPane};
use crate::revision::{Revision, RevisionStatus};
use crate::views::ViewId;

/// Main draw function - orchestrates all rendering
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let main_layout = Layout::vertical([
        Constraint::Length(1), // Header
        Constraint::Length(1), // Tabs
        Constraint::Min(5),    // Content
        Constraint::Length(1), // Footer/status
    ])
    .split(area);

    draw_header(frame, app, main_layout[0]);
    draw_tabs(frame, app, main_layout[1]);

    match app.views.get(app.active) {
        Some(Pane::Tree(_)) => {
            let content = Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(main_layout[2]);
            draw_tree(frame, app, content[0]);
            draw_detail(frame, app, content[1]);
        }
        Some(Pane::Settings(settings)) => draw_settings(frame, app, settings, main_layout[2]),
        Some(Pane::Output) => draw_output(frame, app, main_layout[2]),
        None => {}
    }

    draw_footer(frame, app, main_layout[3]);

    if app.show_help {
        draw_help_overlay(frame, area);
    }
    if app.confirm.is_some() {
        draw_confirm(frame, app, area);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let current = app.state.current.as_deref().unwrap_or("<base>");
    let pending = app.state.pending().count();
    let busy = if app.busy > 0 { " [running]" } else { "" };

    let header_text = format!(
        " strata │ {} revisions │ current {} │ {} pending{}",
        app.state.revisions.len(),
        current,
        pending,
        busy
    );
    let header = Paragraph::new(header_text).style(Style::default().bg(Color::Blue).fg(Color::White).bold());
    frame.render_widget(header, area);
}

fn draw_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let ids = app.views.ids();
    let titles: Vec<&str> = ids.iter().map(|id| id.title()).collect();
    let selected = ids.iter().position(|id| *id == app.active).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Yellow).bold());
    frame.render_widget(tabs, area);
}

pub fn status_color(status: RevisionStatus) -> Color {
    match status {
        RevisionStatus::Current => Color::Green,
        RevisionStatus::Applied => Color::Blue,
        RevisionStatus::Pending => Color::DarkGray,
    }
}

fn markers(rev: &Revision) -> String {
    let mut tags = Vec::new();
    if rev.is_head {
        tags.push("head");
    }
    if rev.is_branch_point {
        tags.push("branchpoint");
    }
    if rev.is_merge_point {
        tags.push("mergepoint");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!(" ({})", tags.join(", "))
    }
}

fn draw_tree(frame: &mut Frame, app: &App, area: Rect) {
    let display = app.display();
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .filter_map(|row| app.state.revisions.get(row.index).map(|rev| (row.depth, rev)))
        .map(|(depth, rev)| {
            let status = rev.status();
            let bullet = if status == RevisionStatus::Current { "●" } else { "○" };
            let line = Line::from(vec![
                Span::raw("  ".repeat(depth)),
                Span::styled(format!("{} ", bullet), Style::default().fg(status_color(status))),
                Span::styled(rev.short_id(&display), Style::default().fg(status_color(status)).bold()),
                Span::raw(" "),
                Span::raw(rev.display_message(&display)),
                Span::styled(markers(rev), Style::default().fg(Color::DarkGray)),
            ]);
            ListItem::new(line)
        })
        .collect();

    let title = format!(" {} ", ViewId::Tree.title());
    let block = Block::default().title(title).borders(Borders::ALL);

    if items.is_empty() {
        let empty = Paragraph::new(" No revisions yet. Press r to refresh.").block(block);
        frame.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    state.select(Some(app.tree_selected()));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_detail(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().title(" Detail ").borders(Borders::ALL);
    let Some(rev) = app.selected_revision() else {
        frame.render_widget(block, area);
        return;
    };

    let parents = if rev.parents.is_empty() {
        "<base>".to_string()
    } else {
        rev.parents.join(", ")
    };
    let status = rev.status();
    let lines = vec![
        Line::from(vec![Span::raw("Revision: ").bold(), Span::raw(rev.id.clone())]),
        Line::from(vec![Span::raw("Parents:  ").bold(), Span::raw(parents)]),
        Line::from(vec![
            Span::raw("Status:   ").bold(),
            Span::styled(status.as_str(), Style::default().fg(status_color(status))),
        ]),
        Line::from(""),
        Line::from(rev.message.clone()),
    ];

    let detail = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(detail, area);
}

fn draw_settings(frame: &mut Frame, app: &App, settings: &SettingsPane, area: Rect) {
    let path = app.ini_path();
    let title = format!(" {} [{}] ", path.display(), settings.section);
    let items: Vec<ListItem> = settings
        .entries
        .iter()
        .enumerate()
        .map(|(i, (key, value))| {
            let value = match &settings.editing {
                Some(buf) if i == settings.selected => format!("{}▏", buf),
                _ => value.replace('\n', " ⏎ "),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<28}", key), Style::default().fg(Color::Cyan)),
                Span::raw(" = "),
                Span::raw(value),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    state.select(Some(settings.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_output(frame: &mut Frame, app: &App, area: Rect) {
    let text = app.output.contents();
    let inner_height = area.height.saturating_sub(2) as usize;
    let total = text.lines().count();
    // Follow the tail
    let scroll = total.saturating_sub(inner_height) as u16;

    let output = Paragraph::new(text)
        .block(Block::default().title(" Output ").borders(Borders::ALL))
        .scroll((scroll, 0));
    frame.render_widget(output, area);
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    let keybinds = match app.active {
        ViewId::Tree => "j/k:move  u:upgrade to  U:upgrade head  d:downgrade to  s:settings  r:refresh  Tab:view  ?:help  q:quit",
        ViewId::Settings => "j/k:move  Enter:edit  Esc:close  Tab:view  q:quit",
        ViewId::Output => "Tab:view  r:refresh  q:quit",
    };

    let footer_text = match &app.status {
        Some(msg) => msg.clone(),
        None => keybinds.to_string(),
    };
    let footer = Paragraph::new(format!(" {}", footer_text)).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(footer, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

fn draw_confirm(frame: &mut Frame, app: &App, area: Rect) {
    let Some(job) = &app.confirm else { return };
    let popup_area = centered(area, 50, 5);
    frame.render_widget(Clear, popup_area);

    let prompt = Paragraph::new(vec![
        Line::from(format!("Run {}?", job.describe())).bold(),
        Line::from("y: yes   n/Esc: no"),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .title(" Confirm ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(prompt, popup_area);
}

fn draw_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 56, 24);
    frame.render_widget(Clear, popup_area);

    let help_text = r#"
  Revisions
  ─────────────────────────────────
  j/k, ↑/↓     Move up/down
  g/G          Jump to top/bottom
  u            Upgrade to selected revision
  U            Upgrade to head
  d            Downgrade to selected revision
  r            Refresh

  Settings
  ─────────────────────────────────
  s            Open settings
  Enter/e      Edit value
  Esc          Cancel edit / close

  Tab          Switch view
  q            Quit

  Press ? or Esc to close
"#;

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::White).bg(Color::Black));
    frame.render_widget(help, popup_area);
}
