use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::ui::AppState;

// Footer: spinner + transient toast + focus/editing flags + key help.
pub fn draw_footer(f: &mut Frame, area: Rect, state: &AppState, help_text: &str) {
    let mut spans: Vec<Span> = Vec::new();
    if let Some(msg) = &state.status_text {
        let spinner = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"][state.tick as usize % 6];
        spans.push(Span::raw(format!(" {spinner} {msg}")));
        spans.push(Span::raw("  |  "));
    }
    if let Some(t) = &state.toast {
        let color = crate::theme::toast_color(t.level);
        let tag = match t.level {
            crate::ui::ToastLevel::Success => "[OK]",
            crate::ui::ToastLevel::Error => "[ERROR]",
            crate::ui::ToastLevel::Info => "[INFO]",
        };
        spans.push(Span::styled(
            format!("{tag} "),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!("{}  |  ", t.text),
            Style::default().fg(color),
        ));
    }
    let focus = match state.focus {
        crate::ui::Pane::Menu => "menu",
        crate::ui::Pane::Content => "form",
    };
    spans.push(Span::styled(
        format!("focus: {focus}"),
        Style::default().fg(Color::Magenta),
    ));
    if let Some(w) = &state.content {
        if let Some(fw) = w
            .as_any()
            .downcast_ref::<crate::widgets::form_widget::FormWidget>()
        {
            if fw.form.editing {
                spans.push(Span::raw("  |  editing"));
            }
        }
    }
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        help_text.to_string(),
        Style::default().fg(Color::DarkGray),
    ));
    let p = Paragraph::new(Line::from(spans));
    f.render_widget(p, area);
}
