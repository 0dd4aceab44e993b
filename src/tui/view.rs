use super::help::draw_help;
use super::state::{Focus, UiState};
use crate::editor::{DraftField, EditorMode, EditorState, LicenseEditor};
use crate::gate::Prompt;
use crate::lifecycle::{LifecycleSession, SessionState};
use crate::model::LicenseStatus;
use crate::notify::NoticeLevel;
use crate::query::{PageState, StatusFilter};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

pub fn draw(area: Rect, f: &mut Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    draw_chips(chunks[0], f, state);
    draw_search(chunks[1], f, state);
    draw_table(chunks[2], f, state);
    draw_footer(chunks[3], f, state);
    draw_status(chunks[4], f, state);

    if let Some(detail) = state.coordinator.detail() {
        draw_detail(popup_area(area, 70, 70), f, detail);
        if let Some(prompt) = detail.prompt() {
            draw_prompt(popup_area(area, 50, 25), f, prompt);
        }
    }
    if let Some(editor) = state.coordinator.editor() {
        draw_editor(popup_area(area, 70, 75), f, editor);
        if let Some(prompt) = editor.prompt() {
            draw_prompt(popup_area(area, 50, 25), f, prompt);
        }
    }
    if state.show_help {
        draw_help(popup_area(area, 80, 90), f);
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

fn draw_chips(area: Rect, f: &mut Frame, state: &UiState) {
    let mut spans = Vec::new();
    for filter in StatusFilter::CHOICES {
        let style = if filter == state.query.status_filter() {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", filter.label()), style));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        format!("  {}", state.coordinator.address()),
        Style::default().fg(Color::DarkGray),
    ));
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("license-desk"));
    f.render_widget(p, area);
}

fn draw_search(area: Rect, f: &mut Frame, state: &UiState) {
    let editing = state.focus == Focus::Search;
    let mut spans = vec![
        Span::styled(
            format!("[{}] ", state.query.search_category().label()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(state.query.search_keywords().to_string()),
    ];
    if editing {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }
    if let Some(msg) = state.query.validation() {
        spans.push(Span::styled(format!("  {msg}"), Style::default().fg(Color::Red)));
    } else if let Some(search) = state.query.applied_search() {
        spans.push(Span::styled(
            format!("  (当前: {} = {})", search.category.label(), search.value),
            Style::default().fg(Color::DarkGray),
        ));
    }
    let border = if editing { Color::Yellow } else { Color::Reset };
    let p = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title("搜索"),
    );
    f.render_widget(p, area);
}

fn status_color(status: LicenseStatus) -> Color {
    match status {
        LicenseStatus::Available => Color::Green,
        LicenseStatus::Assigned => Color::Cyan,
        LicenseStatus::Expired => Color::Red,
        LicenseStatus::Unknown(_) => Color::Gray,
    }
}

fn draw_table(area: Rect, f: &mut Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("授权列表");
    let message = match state.query.state() {
        PageState::Loading => Some(Line::from("加载中…")),
        PageState::Failed(e) => Some(Line::from(Span::styled(
            format!("加载失败: {e}"),
            Style::default().fg(Color::Red),
        ))),
        PageState::Ready(page) if page.rows.is_empty() => Some(Line::from("暂无数据")),
        PageState::Ready(_) => None,
    };
    if let Some(line) = message {
        f.render_widget(Paragraph::new(line).block(block), area);
        return;
    }

    let header = Row::new(["ID", "软件名称", "授权类型", "状态", "过期时间", "职级限制"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let rows = state.query.rows().iter().map(|l| {
        let status = Span::styled(
            l.display_status(),
            Style::default().fg(status_color(l.license_status)),
        );
        Row::new(vec![
            Cell::from(l.license_id.to_string()),
            Cell::from(l.software_name().unwrap_or("-").to_string()),
            Cell::from(l.license_type_label()),
            Cell::from(status),
            Cell::from(l.formatted_expired_at()),
            Cell::from(l.level_limit.map(|lv| lv.to_string()).unwrap_or_default()),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Min(16),
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(21),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray))
    .highlight_symbol("> ");
    let mut table_state = TableState::default().with_selected(Some(state.selected));
    f.render_stateful_widget(table, area, &mut table_state);
}

fn draw_footer(area: Rect, f: &mut Frame, state: &UiState) {
    let line = Line::from(vec![
        Span::raw(format!(
            " 第 {} 页 · 每页 {} 条 · 共 {} 条 ",
            state.query.page() + 1,
            state.query.page_size(),
            state.query.row_count()
        )),
        Span::styled("n/p", Style::default().fg(Color::Magenta)),
        Span::raw(" 翻页  "),
        Span::styled("+/-", Style::default().fg(Color::Magenta)),
        Span::raw(" 每页条数  "),
        Span::styled("?", Style::default().fg(Color::Magenta)),
        Span::raw(" 帮助"),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_status(area: Rect, f: &mut Frame, state: &UiState) {
    let color = match state.info_level {
        NoticeLevel::Error => Color::Red,
        NoticeLevel::Success => Color::Green,
        NoticeLevel::Info => Color::Gray,
    };
    f.render_widget(
        Paragraph::new(Span::styled(format!(" {}", state.info), Style::default().fg(color))),
        area,
    );
}

fn draw_detail(area: Rect, f: &mut Frame, detail: &LifecycleSession) {
    let mut lines: Vec<Line> = Vec::new();
    match detail.state() {
        SessionState::Loading => lines.push(Line::from("加载中…")),
        SessionState::FetchFailed(e) => {
            lines.push(Line::from(Span::styled(
                format!("加载失败: {e}"),
                Style::default().fg(Color::Red),
            )));
            lines.push(Line::from("Esc 关闭后重试"));
        }
        SessionState::Loaded(license) => {
            lines.extend(crate::render::detail_lines(license).into_iter().map(Line::from));
            lines.push(Line::from(""));
            let mut actions = Vec::new();
            for (i, action) in detail.actions().iter().enumerate() {
                let style = if detail.can_trigger() {
                    Style::default().fg(Color::Magenta)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                actions.push(Span::styled(format!("[{}] ", i + 1), style));
                actions.push(Span::raw(format!("{}  ", action.label())));
            }
            if let Some(action) = detail.in_flight() {
                actions.push(Span::styled(
                    format!("{}提交中…", action.label()),
                    Style::default().fg(Color::Yellow),
                ));
            }
            if actions.is_empty() {
                actions.push(Span::styled("只读", Style::default().fg(Color::DarkGray)));
            }
            lines.push(Line::from(actions));
        }
    }
    if let Some(e) = detail.error() {
        lines.push(Line::from(Span::styled(
            format!("操作失败: {e}"),
            Style::default().fg(Color::Red),
        )));
    }
    let title = format!("授权详情 #{}", detail.license_id());
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

fn draw_editor(area: Rect, f: &mut Frame, editor: &LicenseEditor) {
    let title = match editor.mode() {
        EditorMode::Create => "新建授权".to_string(),
        EditorMode::Edit(id) => format!("编辑授权 #{id}"),
    };
    let mut lines: Vec<Line> = Vec::new();
    match editor.state() {
        EditorState::Loading => lines.push(Line::from("加载中…")),
        EditorState::FetchFailed(e) => lines.push(Line::from(Span::styled(
            format!("加载失败: {e}"),
            Style::default().fg(Color::Red),
        ))),
        EditorState::Ready => {
            for field in DraftField::ALL {
                let focused = field == editor.focus();
                let marker = if focused { "> " } else { "  " };
                let value = editor.draft().text(field);
                let value = if field.is_choice() {
                    format!("◀ {value} ▶")
                } else if focused {
                    format!("{value}▏")
                } else {
                    value
                };
                let label_style = if focused {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("{marker}{}: ", field.label()), label_style),
                    Span::raw(value),
                ]));
            }
            if editor.is_saving() {
                lines.push(Line::from(Span::styled(
                    "保存中…",
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
    }
    if let Some(e) = editor.error() {
        lines.push(Line::from(Span::styled(e.to_string(), Style::default().fg(Color::Red))));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("Enter", Style::default().fg(Color::Magenta)),
        Span::raw(" 保存  "),
        Span::styled("Esc", Style::default().fg(Color::Magenta)),
        Span::raw(" 取消"),
    ]));
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

fn draw_prompt(area: Rect, f: &mut Frame, prompt: &Prompt) {
    let p = Paragraph::new(vec![
        Line::from(prompt.body.clone()),
        Line::from(""),
        Line::from(vec![
            Span::styled("y", Style::default().fg(Color::Magenta)),
            Span::raw(" 确认  "),
            Span::styled("n", Style::default().fg(Color::Magenta)),
            Span::raw(" 取消"),
        ]),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(prompt.title.clone()),
    );
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
