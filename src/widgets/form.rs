use crate::behavior::resolve_behavior;
use crate::model::{FieldKind, FieldSpec, ScreenSpec};
use crate::schema::{value_as_string, ValidationSchema};
use crate::widgets::attachment::AttachmentState;
use crate::widgets::chrome::panel_block;
use crate::widgets::ref_select::{RefSelectState, OPTIONS_VISIBLE};
use ratatui::prelude::*;
use ratatui::widgets::*;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

// Per-kind edit state. The scalar value a field contributes is derived from
// this on demand; nothing else holds a second copy of it.
#[derive(Debug)]
pub enum Editor {
    Text { buf: String, masked: bool },
    Multiline { buf: String },
    Number { buf: String },
    Checkbox { on: bool },
    Choice { cursor: usize, picked: Option<usize>, offset: usize },
    MultiChoice { cursor: usize, picked: Vec<bool>, offset: usize },
    Reference(RefSelectState),
    Attachment(AttachmentState),
    Hidden { value: JsonValue },
}

#[derive(Debug)]
pub struct FormField {
    pub spec: FieldSpec,
    pub editor: Editor,
    pub error: Option<String>,
    // Which switch case currently shapes this field (conditional references).
    pub active_case: Option<String>,
}

impl FormField {
    pub fn from_spec(spec: &FieldSpec) -> Self {
        let editor = match spec.kind {
            FieldKind::Text | FieldKind::Email | FieldKind::Date | FieldKind::DateTime => {
                Editor::Text {
                    buf: String::new(),
                    masked: false,
                }
            }
            FieldKind::Password => Editor::Text {
                buf: String::new(),
                masked: true,
            },
            FieldKind::Custom => Editor::Text {
                buf: String::new(),
                masked: false,
            },
            FieldKind::Multiline => Editor::Multiline { buf: String::new() },
            FieldKind::Number => Editor::Number { buf: String::new() },
            FieldKind::Boolean => Editor::Checkbox { on: false },
            FieldKind::Select | FieldKind::Radio => Editor::Choice {
                cursor: 0,
                picked: None,
                offset: 0,
            },
            FieldKind::MultiSelect => Editor::MultiChoice {
                cursor: 0,
                picked: vec![false; spec.options.len()],
                offset: 0,
            },
            FieldKind::Reference => Editor::Reference(RefSelectState::new(spec.reference.clone())),
            FieldKind::File | FieldKind::Image => {
                let mut st = AttachmentState::new(spec.attachment.clone().unwrap_or_default());
                st.read_only = spec.read_only;
                Editor::Attachment(st)
            }
            FieldKind::Hidden => Editor::Hidden {
                value: JsonValue::Null,
            },
        };
        let mut field = Self {
            spec: spec.clone(),
            editor,
            error: None,
            active_case: None,
        };
        if let Some(def) = &spec.default {
            field.set_value(&def.clone());
        }
        field
    }

    pub fn value(&self) -> JsonValue {
        match &self.editor {
            Editor::Text { buf, .. } | Editor::Multiline { buf } | Editor::Number { buf } => {
                JsonValue::String(buf.clone())
            }
            Editor::Checkbox { on } => JsonValue::Bool(*on),
            Editor::Choice { picked, .. } => picked
                .and_then(|i| self.spec.options.get(i))
                .map(|c| c.value.clone())
                .unwrap_or(JsonValue::Null),
            Editor::MultiChoice { picked, .. } => {
                let vals: Vec<JsonValue> = self
                    .spec
                    .options
                    .iter()
                    .zip(picked.iter())
                    .filter(|(_, on)| **on)
                    .map(|(c, _)| c.value.clone())
                    .collect();
                JsonValue::Array(vals)
            }
            Editor::Reference(st) => st
                .value()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
            Editor::Attachment(st) => st.value_json(),
            Editor::Hidden { value } => value.clone(),
        }
    }

    pub fn set_value(&mut self, v: &JsonValue) {
        match &mut self.editor {
            Editor::Text { buf, .. } | Editor::Multiline { buf } | Editor::Number { buf } => {
                *buf = value_as_string(v);
            }
            Editor::Checkbox { on } => {
                *on = v.as_bool().unwrap_or(v.as_str() == Some("true"));
            }
            Editor::Choice { picked, cursor, .. } => {
                let pos = self
                    .spec
                    .options
                    .iter()
                    .position(|c| c.value == *v || value_as_string(&c.value) == value_as_string(v));
                *picked = pos;
                *cursor = pos.unwrap_or(0);
            }
            Editor::MultiChoice { picked, .. } => {
                let wanted: Vec<String> = match v {
                    JsonValue::Array(arr) => arr.iter().map(value_as_string).collect(),
                    JsonValue::Null => Vec::new(),
                    other => vec![value_as_string(other)],
                };
                for (i, c) in self.spec.options.iter().enumerate() {
                    if let Some(slot) = picked.get_mut(i) {
                        *slot = wanted.contains(&value_as_string(&c.value));
                    }
                }
            }
            Editor::Reference(st) => match v {
                JsonValue::Null => st.clear_selection(),
                other => st.bind_existing(&value_as_string(other)),
            },
            Editor::Attachment(st) => match v {
                JsonValue::String(s) => st.bind_existing(Some(s.clone())),
                _ => st.bind_existing(None),
            },
            Editor::Hidden { value } => *value = v.clone(),
        }
    }

    fn summary(&self) -> String {
        match &self.editor {
            Editor::Text { buf, masked } => {
                if *masked {
                    "•".repeat(buf.chars().count())
                } else if self.spec.kind == FieldKind::Custom {
                    self.spec
                        .behavior
                        .as_deref()
                        .and_then(resolve_behavior)
                        .map(|b| b.summarize(&JsonValue::String(buf.clone())))
                        .unwrap_or_else(|| buf.clone())
                } else {
                    buf.clone()
                }
            }
            Editor::Multiline { buf } => buf.lines().next().unwrap_or("").to_string(),
            Editor::Number { buf } => buf.clone(),
            Editor::Checkbox { on } => if *on { "[x]" } else { "[ ]" }.to_string(),
            Editor::Choice { picked, .. } => picked
                .and_then(|i| self.spec.options.get(i))
                .map(|c| c.label.clone())
                .unwrap_or_else(|| "(none)".into()),
            Editor::MultiChoice { picked, .. } => {
                let count = picked.iter().filter(|b| **b).count();
                format!("{count} selected")
            }
            Editor::Reference(st) => st.display().unwrap_or_else(|| "(none)".into()),
            Editor::Attachment(st) => st.summary(),
            Editor::Hidden { .. } => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    Reset,
    Cancel,
}

#[derive(Debug)]
pub struct FormState {
    pub title: String,
    pub fields: Vec<FormField>,
    pub selected: usize,
    pub editing: bool,
    pub message: Option<String>,
    pub disabled: bool,
    pub dirty: bool,
    pub confirm: Option<ConfirmAction>,
}

impl FormState {
    pub fn from_screen(screen: &ScreenSpec) -> Self {
        Self {
            title: screen.title.clone(),
            fields: screen.fields.iter().map(FormField::from_spec).collect(),
            selected: 0,
            editing: false,
            message: None,
            disabled: false,
            dirty: false,
            confirm: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.spec.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FormField> {
        self.fields.iter_mut().find(|f| f.spec.name == name)
    }
}

pub fn values(form: &FormState) -> BTreeMap<String, JsonValue> {
    form.fields
        .iter()
        .map(|f| (f.spec.name.clone(), f.value()))
        .collect()
}

// Update-mode load: seed every field from the fetched entity object.
pub fn set_values(form: &mut FormState, data: &JsonValue) {
    for f in &mut form.fields {
        if let Some(v) = data.get(&f.spec.name) {
            f.set_value(v);
        }
        f.error = None;
    }
}

pub fn dirty_fields(
    form: &FormState,
    original: &BTreeMap<String, JsonValue>,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for f in &form.fields {
        let baseline = original.get(&f.spec.name).cloned().unwrap_or(JsonValue::Null);
        if f.value() != baseline {
            out.insert(f.spec.name.clone());
        }
    }
    out
}

pub fn compute_dirty(form: &mut FormState, original: &BTreeMap<String, JsonValue>) -> bool {
    form.dirty = !dirty_fields(form, original).is_empty();
    form.dirty
}

pub fn reset_to_original(form: &mut FormState, original: &BTreeMap<String, JsonValue>) {
    for f in &mut form.fields {
        let baseline = original.get(&f.spec.name).cloned().unwrap_or(JsonValue::Null);
        f.set_value(&baseline);
        f.error = None;
    }
    form.message = Some("Reset".into());
    form.confirm = None;
    compute_dirty(form, original);
}

// Full pass, the submit gate. Per-field checks run on edit for feedback; this
// is the authoritative one.
pub fn validate_form(form: &mut FormState, schema: &ValidationSchema) -> bool {
    let mut ok = true;
    for f in &mut form.fields {
        validate_field(f, schema);
        if f.error.is_some() {
            ok = false;
        }
    }
    form.message = if ok {
        None
    } else {
        Some("Please fix the highlighted errors".into())
    };
    ok
}

pub fn validate_field(field: &mut FormField, schema: &ValidationSchema) {
    field.error = None;
    if field.spec.read_only {
        return;
    }
    let value = field.value();
    if let Some(rule) = schema.rule(&field.spec.name) {
        if let Err(msg) = rule.check(&value) {
            field.error = Some(msg);
            return;
        }
    }
    match &field.editor {
        Editor::Attachment(st) => {
            if field.spec.required && !st.required_satisfied() {
                field.error = Some("This field is required".into());
            }
        }
        Editor::Text { buf, .. } if field.spec.kind == FieldKind::Custom => {
            if field.spec.required && buf.trim().is_empty() {
                field.error = Some("This field is required".into());
            } else if let Some(b) = field.spec.behavior.as_deref().and_then(resolve_behavior) {
                if let Err(msg) = b.validate(&JsonValue::String(buf.clone())) {
                    field.error = Some(msg);
                }
            }
        }
        _ => {}
    }
}

fn value_style(form: &FormState, i: usize) -> Style {
    if i == form.selected {
        if form.editing {
            crate::theme::text_editing_bold()
        } else {
            crate::theme::text_active_bold()
        }
    } else {
        Style::default()
    }
}

pub fn draw_form(f: &mut Frame, area: Rect, form: &mut FormState, highlight: bool, cursor_on: bool) {
    let mut lines: Vec<Line> = Vec::new();
    for (i, fld) in form.fields.iter().enumerate() {
        if matches!(fld.editor, Editor::Hidden { .. }) {
            continue;
        }
        let sel = if i == form.selected { '›' } else { ' ' };
        let req = if fld.spec.required { " *" } else { "" };
        let editing_here = form.editing && i == form.selected;
        let style = if fld.spec.read_only {
            crate::theme::text_muted()
        } else {
            value_style(form, i)
        };
        let mut summary = fld.summary();
        let text_cursor = editing_here
            && cursor_on
            && matches!(
                fld.editor,
                Editor::Text { .. } | Editor::Number { .. }
            );
        if text_cursor {
            summary.push('▏');
        }
        lines.push(Line::from(vec![
            Span::raw(format!("{sel} {}{req}: ", fld.spec.label())),
            Span::styled(summary, style),
        ]));

        match &fld.editor {
            Editor::Multiline { buf } => {
                // Body after the header line; folded to the configured height.
                let max_lines = fld.spec.edit_lines.unwrap_or(3);
                let body: Vec<&str> = buf.lines().collect();
                for l in body.iter().skip(1).take(max_lines.saturating_sub(1)) {
                    lines.push(Line::from(vec![Span::raw("  "), Span::styled(l.to_string(), style)]));
                }
                if body.len() > max_lines {
                    let more = body.len() - max_lines;
                    lines.push(Line::from(Span::styled(
                        format!("  … ({more} more line{})", if more == 1 { "" } else { "s" }),
                        crate::theme::text_muted(),
                    )));
                }
            }
            Editor::Choice { cursor, picked, offset } if editing_here => {
                let start = (*offset).min(fld.spec.options.len());
                let end = (start + OPTIONS_VISIBLE).min(fld.spec.options.len());
                for (oi, opt) in fld.spec.options.iter().enumerate().take(end).skip(start) {
                    let mark = if Some(oi) == *picked { "(•)" } else { "( )" };
                    let cur = if oi == *cursor { '›' } else { ' ' };
                    let st = if oi == *cursor {
                        crate::theme::list_cursor_style()
                    } else {
                        crate::theme::text_muted()
                    };
                    lines.push(Line::from(Span::styled(
                        format!("  {cur} {mark} {}", opt.label),
                        st,
                    )));
                }
            }
            Editor::MultiChoice { cursor, picked, offset } if editing_here => {
                let start = (*offset).min(fld.spec.options.len());
                let end = (start + OPTIONS_VISIBLE).min(fld.spec.options.len());
                for (oi, opt) in fld.spec.options.iter().enumerate().take(end).skip(start) {
                    let chk = if *picked.get(oi).unwrap_or(&false) {
                        "[x]"
                    } else {
                        "[ ]"
                    };
                    let cur = if oi == *cursor { '›' } else { ' ' };
                    let st = if oi == *cursor {
                        crate::theme::list_cursor_style()
                    } else {
                        crate::theme::text_muted()
                    };
                    lines.push(Line::from(Span::styled(
                        format!("  {cur} {chk} {}", opt.label),
                        st,
                    )));
                }
            }
            Editor::Reference(st) if editing_here => {
                let mut search = st.search.clone();
                if cursor_on {
                    search.push('▏');
                }
                lines.push(Line::from(vec![
                    Span::raw("  / "),
                    Span::styled(search, crate::theme::text_editing_bold()),
                ]));
                let start = st.offset.min(st.options.len());
                let end = (start + OPTIONS_VISIBLE).min(st.options.len());
                for (oi, opt) in st.options.iter().enumerate().take(end).skip(start) {
                    let cur = if oi == st.cursor { '›' } else { ' ' };
                    let row_style = if oi == st.cursor {
                        crate::theme::list_cursor_style()
                    } else {
                        crate::theme::text_muted()
                    };
                    lines.push(Line::from(Span::styled(
                        format!("  {cur} {}", opt.label),
                        row_style,
                    )));
                }
                if st.in_flight {
                    lines.push(Line::from(Span::styled(
                        "  … loading",
                        crate::theme::text_muted(),
                    )));
                } else if st.options.is_empty() {
                    lines.push(Line::from(Span::styled(
                        "  (no options)",
                        crate::theme::text_muted(),
                    )));
                }
            }
            Editor::Attachment(st) if editing_here && !st.read_only => {
                let mut input = st.input.clone();
                if cursor_on {
                    input.push('▏');
                }
                lines.push(Line::from(vec![
                    Span::raw("  path: "),
                    Span::styled(input, crate::theme::text_editing_bold()),
                ]));
                lines.push(Line::from(Span::styled(
                    "  Enter attach • Del remove • Esc keep",
                    crate::theme::text_muted(),
                )));
            }
            _ => {}
        }

        if let Some(err) = &fld.error {
            lines.push(Line::from(Span::styled(
                format!("  ! {err}"),
                crate::theme::text_error(),
            )));
        }
    }

    // Buttons: Save | Reset | Cancel
    if !form.fields.is_empty() {
        lines.push(Line::from(""));
    }
    let save_idx = form.fields.len();
    let reset_idx = form.fields.len() + 1;
    let cancel_idx = form.fields.len() + 2;
    let can_save = !form.disabled && form.dirty;
    let can_reset = form.dirty && !form.disabled;
    let mut save_style = if can_save {
        crate::theme::text_active_bold()
    } else {
        crate::theme::text_muted()
    };
    let mut reset_style = if can_reset {
        Style::default().fg(crate::theme::ACTIVE)
    } else {
        crate::theme::text_muted()
    };
    let mut cancel_style = crate::theme::text_muted();
    if form.selected == save_idx {
        save_style = if can_save {
            crate::theme::list_cursor_style()
        } else {
            Style::default().fg(crate::theme::MUTED).bg(crate::theme::ACCENT)
        };
    }
    if form.selected == reset_idx {
        reset_style = crate::theme::list_cursor_style();
    }
    if form.selected == cancel_idx {
        cancel_style = crate::theme::list_cursor_style();
    }
    lines.push(Line::from(vec![
        Span::styled("  [ Save ]  ", save_style),
        Span::styled("Reset  ", reset_style),
        Span::styled("Cancel", cancel_style),
    ]));
    if let Some(msg) = &form.message {
        lines.push(Line::from(Span::styled(
            msg.clone(),
            crate::theme::text_muted(),
        )));
    }
    let title = if form.editing {
        format!("{} — editing", form.title)
    } else {
        form.title.clone()
    };
    let block = panel_block(&title, highlight);
    let p = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}
