use crate::app::Effect;
use crate::nav::keys;
use crate::schema::{generate_schema, ValidationSchema};
use crate::session::{self, FormSession, SessionStatus};
use crate::widgets::form::{self, ConfirmAction, Editor, FormState};
use crate::widgets::chrome::panel_block;
use crossterm::event::KeyCode;
use ratatui::crossterm::event as rt_event;
use ratatui::prelude::*;
use ratatui::widgets::{Clear, Paragraph};
use std::collections::HashMap;
use std::time::Instant;
use tui_textarea::TextArea;

// One mounted create/update screen: form state, session lifecycle, generated
// schema and the textarea overlays for multiline fields.
pub struct FormWidget {
    pub form: FormState,
    pub session: FormSession,
    schema: ValidationSchema,
    ta_map: HashMap<String, TextArea<'static>>,
}

impl FormWidget {
    pub fn new(screen: crate::model::ScreenSpec) -> Self {
        let mut form = FormState::from_screen(&screen);
        let schema = generate_schema(&screen.fields);
        let mut session = FormSession::new(screen);
        if !session.is_update() {
            // Create mode: defaults are live immediately.
            session::derive_switch_configs(&mut form);
            session.capture_original(&mut form);
        }
        let mut ta_map: HashMap<String, TextArea<'static>> = HashMap::new();
        for f in &form.fields {
            if let Editor::Multiline { buf } = &f.editor {
                let mut ta = TextArea::default();
                if !buf.is_empty() {
                    ta.insert_str(buf);
                }
                ta_map.insert(f.spec.name.clone(), ta);
            }
        }
        Self {
            form,
            session,
            schema,
            ta_map,
        }
    }

    pub fn entity_load_key(&self) -> String {
        keys::entity_key(&self.session.screen.id)
    }

    pub fn submit_load_key(&self) -> String {
        keys::submit_key(&self.session.screen.id)
    }

    pub fn fetch_effect(&self) -> Option<Effect> {
        let id = self.session.entity_id()?.to_string();
        Some(Effect::FetchEntity {
            entity: self.session.screen.entity.clone(),
            id,
            key: self.entity_load_key(),
        })
    }

    // Tick pump: expire the success/error window and fire debounced
    // reference searches whose quiet interval has elapsed.
    pub fn on_tick(&mut self, tick: u64, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.session.on_tick(&mut self.form, tick);
        for f in &mut self.form.fields {
            if let Editor::Reference(st) = &mut f.editor {
                if let Some(request) = st.pump(now) {
                    effects.push(Effect::LoadOptions {
                        field: f.spec.name.clone(),
                        request,
                    });
                }
            }
        }
        effects
    }

    pub fn commit_textarea(&mut self) -> bool {
        if !self.form.editing {
            return false;
        }
        let sel = self.form.selected;
        let Some(fld) = self.form.fields.get_mut(sel) else {
            return false;
        };
        let name = fld.spec.name.clone();
        if let Editor::Multiline { buf } = &mut fld.editor {
            if let Some(ta) = self.ta_map.get(&name) {
                *buf = ta.lines().join("\n");
                self.form.editing = false;
                self.after_edit(&name);
                return true;
            }
        }
        false
    }

    pub fn cancel_textarea(&mut self) -> bool {
        if !self.form.editing {
            return false;
        }
        if let Some(fld) = self.form.fields.get(self.form.selected) {
            if matches!(fld.editor, Editor::Multiline { .. }) {
                self.form.editing = false;
                return true;
            }
        }
        false
    }

    fn editing_multiline(&self) -> bool {
        self.form.editing
            && self
                .form
                .fields
                .get(self.form.selected)
                .map(|f| matches!(f.editor, Editor::Multiline { .. }))
                .unwrap_or(false)
    }

    // Shared post-edit path: cut any success/error window short, revalidate
    // the touched field, recompute dirtiness and re-derive dependents.
    fn after_edit(&mut self, name: &str) {
        self.session.edited(&mut self.form);
        if let Some(fld) = self.form.field_mut(name) {
            form::validate_field(fld, &self.schema);
        }
        let touched = session::apply_switches(&mut self.form, name);
        for t in &touched {
            if let Some(fld) = self.form.field_mut(t) {
                fld.error = None;
            }
        }
        form::compute_dirty(&mut self.form, &self.session.original);
    }

    fn selectable(&self, idx: usize) -> bool {
        match self.form.fields.get(idx) {
            Some(f) => !matches!(f.editor, Editor::Hidden { .. }),
            // Button rows
            None => idx <= self.form.fields.len() + 2,
        }
    }

    fn select_prev(&mut self) {
        let mut i = self.form.selected;
        while i > 0 {
            i -= 1;
            if self.selectable(i) {
                self.form.selected = i;
                return;
            }
        }
    }

    fn select_next(&mut self) {
        let max_idx = self.form.fields.len() + 2;
        let mut i = self.form.selected;
        while i < max_idx {
            i += 1;
            if self.selectable(i) {
                self.form.selected = i;
                return;
            }
        }
    }

    fn handle_editing_key(&mut self, key: KeyCode) -> Vec<Effect> {
        let mut effects = Vec::new();
        let sel = self.form.selected;
        let Some(fld) = self.form.fields.get_mut(sel) else {
            return effects;
        };
        let name = fld.spec.name.clone();
        let now = Instant::now();
        let mut done_editing = false;
        let mut edited = false;
        match &mut fld.editor {
            Editor::Text { buf, .. } => match key {
                KeyCode::Char(c) => {
                    buf.push(c);
                    edited = true;
                }
                KeyCode::Backspace => {
                    buf.pop();
                    edited = true;
                }
                KeyCode::Enter | KeyCode::Esc => done_editing = true,
                _ => {}
            },
            Editor::Number { buf } => match key {
                KeyCode::Char(c) => {
                    if c.is_ascii_digit()
                        || (c == '.' && !buf.contains('.'))
                        || (c == '-' && buf.is_empty())
                    {
                        buf.push(c);
                        edited = true;
                    }
                }
                KeyCode::Backspace => {
                    buf.pop();
                    edited = true;
                }
                KeyCode::Enter | KeyCode::Esc => done_editing = true,
                _ => {}
            },
            Editor::Multiline { .. } => {
                // Routed into the textarea overlay; Ctrl+S / Esc are handled
                // at the event-loop level via commit/cancel.
                if let Some(ta) = self.ta_map.get_mut(&name) {
                    let code = match key {
                        KeyCode::Char(c) => rt_event::KeyCode::Char(c),
                        KeyCode::Backspace => rt_event::KeyCode::Backspace,
                        KeyCode::Enter => rt_event::KeyCode::Enter,
                        KeyCode::Up => rt_event::KeyCode::Up,
                        KeyCode::Down => rt_event::KeyCode::Down,
                        KeyCode::Left => rt_event::KeyCode::Left,
                        KeyCode::Right => rt_event::KeyCode::Right,
                        KeyCode::Delete => rt_event::KeyCode::Delete,
                        KeyCode::Home => rt_event::KeyCode::Home,
                        KeyCode::End => rt_event::KeyCode::End,
                        _ => return effects,
                    };
                    let _ = ta.input(rt_event::KeyEvent::new(code, rt_event::KeyModifiers::NONE));
                }
                return effects;
            }
            Editor::Choice { cursor, picked, offset } => match key {
                KeyCode::Up => {
                    if *cursor > 0 {
                        *cursor -= 1;
                    }
                    if *cursor < *offset {
                        *offset = *cursor;
                    }
                }
                KeyCode::Down => {
                    if *cursor + 1 < fld.spec.options.len() {
                        *cursor += 1;
                    }
                    if *cursor >= *offset + crate::widgets::ref_select::OPTIONS_VISIBLE {
                        *offset = *cursor + 1 - crate::widgets::ref_select::OPTIONS_VISIBLE;
                    }
                }
                KeyCode::Enter => {
                    *picked = Some(*cursor);
                    done_editing = true;
                    edited = true;
                }
                KeyCode::Esc => done_editing = true,
                _ => {}
            },
            Editor::MultiChoice { cursor, picked, offset } => match key {
                KeyCode::Up => {
                    if *cursor > 0 {
                        *cursor -= 1;
                    }
                    if *cursor < *offset {
                        *offset = *cursor;
                    }
                }
                KeyCode::Down => {
                    if *cursor + 1 < fld.spec.options.len() {
                        *cursor += 1;
                    }
                    if *cursor >= *offset + crate::widgets::ref_select::OPTIONS_VISIBLE {
                        *offset = *cursor + 1 - crate::widgets::ref_select::OPTIONS_VISIBLE;
                    }
                }
                KeyCode::Enter | KeyCode::Char(' ') => {
                    if let Some(slot) = picked.get_mut(*cursor) {
                        *slot = !*slot;
                        edited = true;
                    }
                }
                KeyCode::Esc => done_editing = true,
                _ => {}
            },
            Editor::Reference(st) => match key {
                KeyCode::Char(c) => st.input(c, now),
                KeyCode::Backspace => st.backspace(now),
                KeyCode::Up => {
                    if let Some(req) = st.move_cursor(-1) {
                        effects.push(Effect::LoadOptions {
                            field: name.clone(),
                            request: req,
                        });
                    }
                }
                KeyCode::Down => {
                    if let Some(req) = st.move_cursor(1) {
                        effects.push(Effect::LoadOptions {
                            field: name.clone(),
                            request: req,
                        });
                    }
                }
                KeyCode::Enter => {
                    if st.choose() {
                        done_editing = true;
                        edited = true;
                    }
                }
                KeyCode::Delete => {
                    st.clear_selection();
                    done_editing = true;
                    edited = true;
                }
                KeyCode::Esc => {
                    st.close();
                    done_editing = true;
                }
                _ => {}
            },
            Editor::Attachment(st) => match key {
                KeyCode::Char(c) => st.input.push(c),
                KeyCode::Backspace => {
                    st.input.pop();
                }
                KeyCode::Enter => {
                    let path = std::path::PathBuf::from(st.input.trim());
                    match st.stage_path(&path) {
                        Ok(()) => {
                            fld.error = None;
                            done_editing = true;
                            edited = true;
                        }
                        Err(msg) => {
                            fld.error = Some(msg);
                        }
                    }
                }
                KeyCode::Delete => {
                    st.remove();
                    done_editing = true;
                    edited = true;
                }
                KeyCode::Esc => done_editing = true,
                _ => {}
            },
            Editor::Checkbox { .. } | Editor::Hidden { .. } => done_editing = true,
        }
        if done_editing {
            self.form.editing = false;
        }
        if edited {
            self.after_edit(&name);
        } else if matches!(key, KeyCode::Char(_) | KeyCode::Backspace) {
            // Text-like edits above set `edited`; reference searches land
            // here and still count as activity for the status window.
            self.session.edited(&mut self.form);
        }
        effects
    }

    fn handle_button(&mut self, idx: usize) -> Vec<Effect> {
        let mut effects = Vec::new();
        let save_idx = self.form.fields.len();
        let reset_idx = save_idx + 1;
        let cancel_idx = save_idx + 2;
        if idx == save_idx {
            if self.form.disabled || !self.form.dirty {
                return effects;
            }
            if !form::validate_form(&mut self.form, &self.schema) {
                return effects;
            }
            let payload = self.session.build_payload(&self.form);
            self.session.begin_submit();
            self.form.confirm = None;
            effects.push(Effect::Persist {
                entity: self.session.screen.entity.clone(),
                entity_id: self.session.entity_id().map(|s| s.to_string()),
                payload,
                key: self.submit_load_key(),
            });
        } else if idx == reset_idx {
            if !self.form.dirty {
                return effects;
            }
            if self.form.confirm == Some(ConfirmAction::Reset) {
                self.session.reset(&mut self.form);
                effects.push(Effect::ShowToast {
                    text: "Reset".into(),
                    level: crate::ui::ToastLevel::Info,
                    seconds: 2,
                });
            } else {
                self.form.confirm = Some(ConfirmAction::Reset);
                self.form.message = Some("Press Enter to confirm Reset • Esc to cancel".into());
            }
        } else if idx == cancel_idx {
            if self.form.confirm == Some(ConfirmAction::Cancel) {
                self.form.confirm = None;
                effects.push(Effect::CloseScreen);
            } else {
                self.form.confirm = Some(ConfirmAction::Cancel);
                self.form.message = Some("Press Enter to confirm Cancel • Esc to stay".into());
            }
        }
        effects
    }

    fn enter_field(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let sel = self.form.selected;
        let Some(fld) = self.form.fields.get_mut(sel) else {
            return effects;
        };
        if fld.spec.read_only {
            return effects;
        }
        let name = fld.spec.name.clone();
        match &mut fld.editor {
            Editor::Checkbox { on } => {
                *on = !*on;
                self.after_edit(&name);
            }
            Editor::Choice { cursor, picked, .. } => {
                *cursor = picked.unwrap_or(0);
                self.form.editing = true;
            }
            Editor::Reference(st) => {
                if let Some(req) = st.open() {
                    effects.push(Effect::LoadOptions {
                        field: name,
                        request: req,
                    });
                }
                self.form.editing = true;
            }
            Editor::Multiline { buf } => {
                let mut ta = TextArea::default();
                if !buf.is_empty() {
                    ta.insert_str(buf.as_str());
                }
                self.ta_map.insert(name, ta);
                self.form.editing = true;
            }
            Editor::Hidden { .. } => {}
            _ => {
                self.form.editing = true;
            }
        }
        effects
    }
}

impl crate::widgets::Widget for FormWidget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, tick: u64) {
        match &self.session.status {
            SessionStatus::Loading => {
                let spinner = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"][tick as usize % 6];
                let p = Paragraph::new(format!("{spinner} Loading..."))
                    .block(panel_block(&self.form.title, focused));
                f.render_widget(p, area);
                return;
            }
            SessionStatus::DataError { message } => {
                let lines = vec![
                    Line::from(Span::styled(
                        format!("! {message}"),
                        crate::theme::text_error(),
                    )),
                    Line::from(""),
                    Line::from(Span::styled(
                        "Press r to retry",
                        crate::theme::text_muted(),
                    )),
                ];
                let p = Paragraph::new(lines).block(panel_block(&self.form.title, focused));
                f.render_widget(p, area);
                return;
            }
            SessionStatus::Submitting => {
                self.form.disabled = true;
                self.form.message = Some("Submitting...".into());
            }
            SessionStatus::Success { .. } => {
                self.form.disabled = false;
                self.form.message = Some("Saved".into());
            }
            SessionStatus::Error { message, .. } => {
                self.form.disabled = false;
                self.form.message = Some(message.clone());
            }
            SessionStatus::Ready => {
                self.form.disabled = false;
            }
        }
        let mut cursor_on = tick % 2 == 0;
        if self.editing_multiline() {
            cursor_on = false;
        }
        form::draw_form(f, area, &mut self.form, focused, cursor_on);
        // Multiline overlay editor
        if self.editing_multiline() {
            if let Some(fld) = self.form.fields.get(self.form.selected) {
                let name = fld.spec.name.clone();
                let label = fld.spec.label().to_string();
                if let Some(ta) = self.ta_map.get_mut(&name) {
                    ta.set_block(
                        ratatui::widgets::Block::default()
                            .borders(ratatui::widgets::Borders::ALL)
                            .title(format!("Editing: {label} — Ctrl+S Save • Esc Cancel")),
                    );
                    let rect = centered_rect(80, 70, area);
                    f.render_widget(Clear, rect);
                    f.render_widget(&*ta, rect);
                }
            }
        }
    }

    fn on_key(&mut self, key: KeyCode) -> Vec<Effect> {
        if self.session.locked() {
            return Vec::new();
        }
        if let SessionStatus::DataError { .. } = self.session.status {
            if matches!(key, KeyCode::Char('r') | KeyCode::Char('R')) {
                if let Some(eff) = self.fetch_effect() {
                    self.session.status = SessionStatus::Loading;
                    return vec![eff];
                }
            }
            return Vec::new();
        }
        if self.form.editing {
            return self.handle_editing_key(key);
        }
        match key {
            KeyCode::Up => {
                self.select_prev();
                Vec::new()
            }
            KeyCode::Down => {
                self.select_next();
                Vec::new()
            }
            KeyCode::Left | KeyCode::Right => {
                let save_idx = self.form.fields.len();
                let reset_idx = save_idx + 1;
                let cancel_idx = save_idx + 2;
                if self.form.selected >= save_idx {
                    // Move between buttons
                    self.form.selected = match (key, self.form.selected) {
                        (KeyCode::Left, i) if i == cancel_idx => reset_idx,
                        (KeyCode::Left, i) if i == reset_idx => save_idx,
                        (KeyCode::Right, i) if i == save_idx => reset_idx,
                        (KeyCode::Right, i) if i == reset_idx => cancel_idx,
                        (_, i) => i,
                    };
                } else {
                    let sel = self.form.selected;
                    if let Some(fld) = self.form.fields.get_mut(sel) {
                        // Quick change for static choices while browsing
                        if fld.spec.read_only {
                            return Vec::new();
                        }
                        let name = fld.spec.name.clone();
                        let n = fld.spec.options.len();
                        if let Editor::Choice { picked, cursor, .. } = &mut fld.editor {
                            if n > 0 {
                                let cur = picked.unwrap_or(0);
                                let next = if key == KeyCode::Left {
                                    (cur + n - 1) % n
                                } else {
                                    (cur + 1) % n
                                };
                                *picked = Some(next);
                                *cursor = next;
                                self.after_edit(&name);
                            }
                        }
                    }
                }
                Vec::new()
            }
            KeyCode::Enter => {
                if self.form.confirm.is_some() && self.form.selected >= self.form.fields.len() {
                    return self.handle_button(self.form.selected);
                }
                if self.form.selected >= self.form.fields.len() {
                    self.handle_button(self.form.selected)
                } else {
                    self.enter_field()
                }
            }
            KeyCode::Esc => {
                if self.form.confirm.is_some() {
                    self.form.confirm = None;
                    self.form.message = None;
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);
    let h = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(v[1]);
    h[1]
}
