use ratatui::style::{Color, Modifier, Style};

#[derive(Clone, Debug)]
pub struct Theme {
    pub bg: Color,
    pub accent: Color,
    pub frame: Color,
    pub selected: Color,
    pub success: Color,
    pub error: Color,
    pub muted: Color,
}

impl Theme {
    pub fn harbor_dark() -> Self {
        Self {
            bg: Color::Rgb(22, 24, 28),
            accent: Color::Rgb(64, 160, 255),
            frame: Color::Rgb(90, 90, 100),
            selected: Color::Rgb(255, 120, 0),
            success: Color::Green,
            error: Color::Red,
            muted: Color::DarkGray,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::harbor_dark()
    }
}

impl Theme {
    pub fn border_focused(&self) -> Style {
        Style::default().fg(self.selected)
    }

    pub fn toast_color(&self, level: crate::ui::ToastLevel) -> Color {
        match level {
            crate::ui::ToastLevel::Success => self.success,
            crate::ui::ToastLevel::Error => self.error,
            crate::ui::ToastLevel::Info => self.accent,
        }
    }
}

pub const ACCENT: Color = Color::Rgb(64, 160, 255);
pub const ACTIVE: Color = Color::Cyan;
pub const MUTED: Color = Color::DarkGray;

// Style helpers shared by the widgets
pub fn border_focused() -> Style {
    Theme::default().border_focused()
}

pub fn text_active_bold() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

pub fn text_editing_bold() -> Style {
    Style::default()
        .fg(Theme::default().selected)
        .add_modifier(Modifier::BOLD)
}

pub fn text_muted() -> Style {
    Style::default().fg(MUTED)
}

pub fn text_error() -> Style {
    Style::default().fg(Theme::default().error)
}

pub fn toast_color(level: crate::ui::ToastLevel) -> Color {
    Theme::default().toast_color(level)
}

pub fn list_cursor_style() -> Style {
    let t = Theme::default();
    Style::default()
        .fg(t.bg)
        .bg(t.selected)
        .add_modifier(Modifier::BOLD)
}
