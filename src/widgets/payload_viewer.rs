use crate::widgets::chrome::panel_block;
use crossterm::event::KeyCode;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use std::sync::OnceLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Style as SynStyle, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};

// Read-only view of a submitted payload or server response: pretty JSON,
// syntax highlighted, scrollable. The raw text backs the clipboard yank.
pub struct PayloadViewerWidget {
    pub title: String,
    pub raw: String,
    lines: Vec<Line<'static>>,
    scroll_y: u16,
    wrap: bool,
    last_viewport_h: u16,
}

impl PayloadViewerWidget {
    pub fn new(title: impl Into<String>, value: serde_json::Value) -> Self {
        let raw = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        let lines = highlight_json(&raw);
        Self {
            title: title.into(),
            raw,
            lines,
            scroll_y: 0,
            wrap: false,
            last_viewport_h: 0,
        }
    }
}

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();
static THEME: OnceLock<Theme> = OnceLock::new();

fn get_syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn get_theme() -> &'static Theme {
    THEME.get_or_init(|| {
        let ts = THEME_SET.get_or_init(ThemeSet::load_defaults);
        ts.themes
            .get("base16-ocean.dark")
            .cloned()
            .unwrap_or_else(|| ts.themes.values().next().cloned().unwrap_or_default())
    })
}

fn syn_to_tui_color(c: syntect::highlighting::Color) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}

fn highlight_json(text: &str) -> Vec<Line<'static>> {
    let ps = get_syntax_set();
    let theme = get_theme();
    let syn: &SyntaxReference = ps
        .find_syntax_by_token("json")
        .unwrap_or_else(|| ps.find_syntax_plain_text());
    let mut high = HighlightLines::new(syn, theme);
    let mut out: Vec<Line<'static>> = Vec::new();
    for line in text.split('\n') {
        let regions: Vec<(SynStyle, &str)> = high.highlight_line(line, ps).unwrap_or_default();
        let mut spans: Vec<Span<'static>> = Vec::new();
        for (st, seg) in regions {
            let mut style = Style::default().fg(syn_to_tui_color(st.foreground));
            if st
                .font_style
                .contains(syntect::highlighting::FontStyle::BOLD)
            {
                style = style.add_modifier(Modifier::BOLD);
            }
            spans.push(Span::styled(seg.to_string(), style));
        }
        out.push(Line::from(spans));
    }
    out
}

impl crate::widgets::Widget for PayloadViewerWidget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, _tick: u64) {
        self.last_viewport_h = area.height.saturating_sub(2);
        let total = self.lines.len() as u16;
        let max_scroll = total.saturating_sub(self.last_viewport_h);
        if self.scroll_y > max_scroll {
            self.scroll_y = max_scroll;
        }
        let block = panel_block(&self.title, focused);
        let p = Paragraph::new(self.lines.clone())
            .block(block)
            .wrap(ratatui::widgets::Wrap { trim: !self.wrap })
            .scroll((self.scroll_y, 0));
        f.render_widget(p, area);
    }

    fn on_key(&mut self, key: KeyCode) -> Vec<crate::app::Effect> {
        match key {
            KeyCode::Up => {
                if self.scroll_y > 0 {
                    self.scroll_y -= 1;
                }
            }
            KeyCode::Down => self.scroll_y = self.scroll_y.saturating_add(1),
            KeyCode::PageUp => {
                let step = self.last_viewport_h;
                self.scroll_y = self.scroll_y.saturating_sub(step);
            }
            KeyCode::PageDown => {
                let step = self.last_viewport_h;
                self.scroll_y = self.scroll_y.saturating_add(step);
            }
            KeyCode::Home => self.scroll_y = 0,
            KeyCode::End => {
                self.scroll_y =
                    (self.lines.len() as u16).saturating_sub(self.last_viewport_h);
            }
            KeyCode::Char('w') | KeyCode::Char('W') => self.wrap = !self.wrap,
            _ => {}
        }
        Vec::new()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
