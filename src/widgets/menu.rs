use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::model::ScreenMode;
use crate::ui::AppState;
use crate::widgets::chrome::panel_block;

#[allow(dead_code)]
pub(crate) fn compute_scroll_window(total: usize, selected: usize, inner_h: u16) -> (usize, usize) {
    if inner_h == 0 || total == 0 {
        return (0, 0);
    }
    let ih = inner_h as usize;
    let sel = selected.min(total.saturating_sub(1));
    let start = sel.saturating_sub(ih - 1);
    let end = (start + ih).min(total);
    (start, end)
}

// Left pane: one row per entity screen.
pub fn draw_screen_menu(f: &mut Frame, area: Rect, state: &AppState) {
    let inner_h = area.height.saturating_sub(2);
    let total = state.config.screens.len();
    let ih = inner_h as usize;
    let max_start = total.saturating_sub(ih);
    let start = state.menu_offset.min(max_start);
    let end = (start + ih).min(total);
    let items: Vec<ListItem> = state
        .config
        .screens
        .iter()
        .enumerate()
        .skip(start)
        .take(end - start)
        .map(|(i, s)| {
            let sel = if i == state.selected { "> " } else { "  " };
            let tag = match s.mode {
                ScreenMode::Create => "[new]",
                ScreenMode::Update => "[edit]",
            };
            let text = format!("{sel}{} {tag}", s.title);
            if i == state.selected {
                ListItem::new(text).style(crate::theme::text_active_bold())
            } else {
                ListItem::new(text)
            }
        })
        .collect();
    let block = panel_block("Screens", matches!(state.focus, crate::ui::Pane::Menu));
    let list = List::new(items).block(block);
    f.render_widget(list, area);
}
