use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("List:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Select row"),
        ]),
        key_line("Enter", 7, "Open detail"),
        key_line("s", 11, "Next status filter"),
        key_line("/", 11, "Edit search keywords (Enter submits, Tab switches category)"),
        key_line("c", 11, "Next search category"),
        key_line("n/p", 9, "Next / previous page"),
        key_line("+/-", 9, "Page size"),
        key_line("r", 11, "Reload"),
        key_line("a", 11, "New license"),
        key_line("e", 11, "Edit selected"),
        key_line("y", 11, "Copy license key to clipboard"),
        key_line("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Detail:"),
        key_line("1-9", 9, "Stage the numbered action"),
        key_line("y/n", 9, "Confirm / cancel a prompt"),
        key_line("e", 11, "Edit this license"),
        key_line("Esc", 9, "Close"),
        Line::from(""),
        Line::from("Editor:"),
        key_line("Tab", 9, "Next field"),
        key_line("←/→", 9, "Change type or status"),
        key_line("Enter", 7, "Save"),
        key_line("Esc", 9, "Discard and close"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
