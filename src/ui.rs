use crate::app::{form_widget_mut, update, AppMsg, Effect};
use crate::model::{validate_console_config, ConsoleConfig};
use crate::nav::keys;
use crate::services::backend::{CatalogBackend, CliBackend};
use crate::widgets::chrome::panel_block;
use crate::widgets::form_widget::FormWidget;
use crate::widgets::menu::draw_screen_menu;
use crate::widgets::ref_select::Choice;
use crate::widgets::status_bar::draw_footer;
use crate::widgets::Widget;
use anyhow::{anyhow, Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub enum LoadKind {
    Entity,
    RefOptions,
    Persist,
}

pub enum LoadOutcome {
    Entity(JsonValue),
    Options {
        version: u64,
        page: u32,
        items: Vec<Choice>,
    },
    Persisted(JsonValue),
}

pub struct LoadMsg {
    pub key: String,
    pub outcome: Result<LoadOutcome, String>,
    pub kind: LoadKind,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Menu,
    Content,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum View {
    #[default]
    Menu,
    Form,
}

#[derive(Clone, Copy, Debug)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

pub struct Toast {
    pub text: String,
    pub level: ToastLevel,
    pub expires_at_tick: u64,
}

#[derive(Default)]
pub(crate) struct AppState {
    pub(crate) config: ConsoleConfig,
    pub(crate) backend: Option<Arc<dyn CatalogBackend>>,
    pub(crate) selected: usize,
    pub(crate) menu_offset: usize,
    pub(crate) menu_viewport_h: u16,
    pub(crate) focus: Pane,
    pub(crate) view: View,
    pub(crate) content: Option<Box<dyn Widget>>,
    pub(crate) tick: u64,
    pub(crate) toast: Option<Toast>,
    pub(crate) status_text: Option<String>,
    // Last successful persistence envelope, for the payload viewer and yank.
    pub(crate) last_result: Option<JsonValue>,
    tx: Option<Sender<LoadMsg>>,
    rx: Option<Receiver<LoadMsg>>,
    pub(crate) theme: crate::theme::Theme,
    pub(crate) debug_log: VecDeque<String>,
}

impl AppState {
    pub fn dbg(&mut self, msg: impl Into<String>) {
        const MAX_LOG_LINES: usize = 200;
        if self.debug_log.len() >= MAX_LOG_LINES {
            self.debug_log.pop_front();
        }
        self.debug_log.push_back(msg.into());
    }
}

fn run_effects(state: &mut AppState, effects: Vec<Effect>) {
    for eff in effects {
        match eff {
            Effect::FetchEntity { entity, id, key } => {
                state.dbg(format!("fetch {entity}/{id} -> {key}"));
                state.status_text = Some(format!("Loading {entity}..."));
                if let (Some(tx), Some(backend)) = (&state.tx, &state.backend) {
                    crate::services::loader::spawn_fetch_entity(
                        backend.clone(),
                        entity,
                        id,
                        key,
                        tx.clone(),
                    );
                }
            }
            Effect::LoadOptions { field, request } => {
                state.dbg(format!(
                    "options {field} q='{}' page {} v{}",
                    request.query, request.page, request.version
                ));
                if let (Some(tx), Some(backend)) = (&state.tx, &state.backend) {
                    let key = keys::ref_key(&field, request.version);
                    crate::services::loader::spawn_fetch_options(
                        backend.clone(),
                        request,
                        key,
                        tx.clone(),
                    );
                }
            }
            Effect::Persist {
                entity,
                entity_id,
                payload,
                key,
            } => {
                state.dbg(format!("persist {entity} -> {key}"));
                state.status_text = Some("Submitting...".into());
                if let (Some(tx), Some(backend)) = (&state.tx, &state.backend) {
                    crate::services::loader::spawn_persist(
                        backend.clone(),
                        entity,
                        entity_id,
                        payload,
                        key,
                        tx.clone(),
                    );
                }
            }
            Effect::ShowToast {
                text,
                level,
                seconds,
            } => {
                let ticks = seconds.saturating_mul(5); // ~200ms tick
                state.toast = Some(Toast {
                    text,
                    level,
                    expires_at_tick: state.tick.saturating_add(ticks),
                });
            }
            Effect::CloseScreen => {
                state.content = None;
                state.view = View::Menu;
                state.focus = Pane::Menu;
            }
        }
    }
}

// -------- config discovery ------------------------------------------------

fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CATALOG_TUI_CONFIG") {
        return Some(PathBuf::from(p));
    }
    if let Ok(dir) = std::env::var("CATALOG_TUI_CONFIG_DIR") {
        let p = PathBuf::from(dir).join("catalog-console.yaml");
        if p.exists() {
            return Some(p);
        }
    }
    for cand in ["catalog-console.yaml", "config/catalog-console.yaml"] {
        let p = PathBuf::from(cand);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

pub(crate) fn load_config() -> Result<ConsoleConfig> {
    let Some(path) = config_path() else {
        return Ok(ConsoleConfig::default());
    };
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg: ConsoleConfig =
        serde_yaml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    validate_console_config(&cfg).map_err(|e| anyhow!("{}: {e}", path.display()))?;
    Ok(cfg)
}

// -------- pumps -----------------------------------------------------------

fn drain_load_msgs(state: &mut AppState) {
    let mut drained: Vec<LoadMsg> = Vec::new();
    if let Some(rx) = &state.rx {
        while let Ok(m) = rx.try_recv() {
            drained.push(m);
        }
    }
    for msg in drained {
        let LoadMsg { key, outcome, kind } = msg;
        let effects = match kind {
            LoadKind::Entity => update(state, AppMsg::LoadedEntity { key, outcome }),
            LoadKind::RefOptions => update(state, AppMsg::LoadedOptions { key, outcome }),
            LoadKind::Persist => update(state, AppMsg::LoadedPersist { key, outcome }),
        };
        run_effects(state, effects);
    }
}

// One 200ms tick: expire toasts, then let the form pump its debounce timers
// and status windows.
fn pump_tick(state: &mut AppState) {
    state.tick = state.tick.wrapping_add(1);
    if let Some(t) = &state.toast {
        if state.tick >= t.expires_at_tick {
            state.toast = None;
        }
    }
    let tick = state.tick;
    let now = Instant::now();
    let effects = match form_widget_mut(state) {
        Some(fw) => fw.on_tick(tick, now),
        None => Vec::new(),
    };
    run_effects(state, effects);
}

// -------- keys ------------------------------------------------------------

fn keep_selected_visible(state: &mut AppState) {
    let ih = state.menu_viewport_h as usize;
    if ih == 0 {
        state.menu_offset = 0;
        return;
    }
    if state.selected < state.menu_offset {
        state.menu_offset = state.selected;
    } else if state.selected >= state.menu_offset + ih {
        state.menu_offset = state.selected + 1 - ih;
    }
}

fn yank_last_result(state: &mut AppState) {
    let content = state
        .last_result
        .as_ref()
        .map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
        .unwrap_or_default();
    if !content.is_empty() {
        if let Ok(mut clipboard) = arboard::Clipboard::new() {
            let _ = clipboard.set_text(&content);
            state.status_text = Some("Copied to clipboard!".to_string());
        }
    }
}

fn open_payload_viewer(state: &mut AppState) {
    if let Some(v) = state.last_result.clone() {
        state.content = Some(Box::new(
            crate::widgets::payload_viewer::PayloadViewerWidget::new("Last response", v),
        ));
        state.focus = Pane::Content;
    }
}

// Returns true when the app should quit.
fn handle_key(state: &mut AppState, key: event::KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') => return true,
            KeyCode::Char('s') | KeyCode::Char('S') => {
                // Commit a multiline overlay.
                if let Some(fw) = form_widget_mut(state) {
                    let _ = fw.commit_textarea();
                }
                return false;
            }
            _ => {}
        }
    }
    match state.focus {
        Pane::Menu => {
            let total = state.config.screens.len();
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('Q') => return true,
                KeyCode::Up => {
                    if state.selected > 0 {
                        state.selected -= 1;
                    }
                    keep_selected_visible(state);
                }
                KeyCode::Down => {
                    if total > 0 && state.selected + 1 < total {
                        state.selected += 1;
                    }
                    keep_selected_visible(state);
                }
                KeyCode::PageUp => {
                    let step = state.menu_viewport_h as usize;
                    state.selected = state.selected.saturating_sub(step.max(1));
                    keep_selected_visible(state);
                }
                KeyCode::PageDown => {
                    let step = state.menu_viewport_h as usize;
                    state.selected = (state.selected + step.max(1)).min(total.saturating_sub(1));
                    keep_selected_visible(state);
                }
                KeyCode::Home => {
                    state.selected = 0;
                    keep_selected_visible(state);
                }
                KeyCode::End => {
                    if total > 0 {
                        state.selected = total - 1;
                    }
                    keep_selected_visible(state);
                }
                KeyCode::Enter => {
                    if let Some(s) = state.config.screens.get(state.selected).cloned() {
                        let effects = update(state, AppMsg::EnterScreen(s));
                        run_effects(state, effects);
                    }
                }
                KeyCode::Tab => {
                    if state.content.is_some() {
                        state.focus = Pane::Content;
                    }
                }
                _ => {}
            }
        }
        Pane::Content => {
            let mut editing = false;
            let mut confirm = false;
            if let Some(w) = &state.content {
                if let Some(fw) = w.as_any().downcast_ref::<FormWidget>() {
                    editing = fw.form.editing;
                    confirm = fw.form.confirm.is_some();
                }
            }
            match key.code {
                KeyCode::Esc if !editing && !confirm => {
                    state.focus = Pane::Menu;
                    return false;
                }
                KeyCode::Tab if !editing => {
                    state.focus = Pane::Menu;
                    return false;
                }
                KeyCode::Char('y') if !editing => {
                    yank_last_result(state);
                    return false;
                }
                KeyCode::Char('p') if !editing => {
                    open_payload_viewer(state);
                    return false;
                }
                KeyCode::Esc if editing => {
                    // A multiline overlay cancels here; other editors see Esc
                    // through their own key handling below.
                    if let Some(fw) = form_widget_mut(state) {
                        if fw.cancel_textarea() {
                            return false;
                        }
                    }
                }
                _ => {}
            }
            let effects = match &mut state.content {
                Some(w) => w.on_key(key.code),
                None => Vec::new(),
            };
            run_effects(state, effects);
        }
    }
    false
}

// -------- drawing ---------------------------------------------------------

fn draw_header(f: &mut Frame, area: Rect, state: &AppState) {
    let border = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(if state.status_text.is_some() {
            crate::theme::ACCENT
        } else {
            crate::theme::MUTED
        }));
    let inner = border.inner(area);
    let title = state
        .config
        .header
        .clone()
        .unwrap_or_else(|| "CATALOG TUI".to_string());
    let p = Paragraph::new(Line::from(Span::styled(
        title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    f.render_widget(p, inner);
    f.render_widget(border, area);
}

fn ui(f: &mut Frame, state: &mut AppState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(f.area());
    draw_header(f, outer[0], state);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(20)])
        .split(outer[1]);
    state.menu_viewport_h = body[0].height.saturating_sub(2);
    keep_selected_visible(state);
    draw_screen_menu(f, body[0], state);
    if let Some(mut w) = state.content.take() {
        w.render(f, body[1], matches!(state.focus, Pane::Content), state.tick);
        state.content = Some(w);
    } else {
        let p = Paragraph::new("Select a screen and press Enter")
            .block(panel_block("Welcome", false))
            .wrap(Wrap { trim: true });
        f.render_widget(p, body[1]);
    }
    draw_footer(
        f,
        outer[2],
        state,
        "Tab focus • Enter open/edit • y yank • p payload • q quit",
    );
}

// -------- entry point -----------------------------------------------------

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

fn auto_enter(state: &mut AppState, id: &str) -> bool {
    if let Some(s) = state
        .config
        .screens
        .iter()
        .find(|s| s.id == id)
        .cloned()
    {
        let effects = update(state, AppMsg::EnterScreen(s));
        run_effects(state, effects);
        return true;
    }
    false
}

pub fn run() -> Result<()> {
    let cfg = load_config()?;
    let mut state = AppState {
        config: cfg,
        backend: Some(Arc::new(CliBackend)),
        theme: crate::theme::Theme::harbor_dark(),
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel::<LoadMsg>();
    state.tx = Some(tx);
    state.rx = Some(rx);

    // Headless smoke mode: render into a TestBackend for a fixed number of
    // ticks, pumping loads exactly like the interactive loop.
    if env_flag("CATALOG_TUI_HEADLESS") {
        let ticks: u64 = std::env::var("CATALOG_TUI_TICKS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let enter_id = std::env::var("CATALOG_TUI_ENTER_ID")
            .ok()
            .or_else(|| state.config.auto_enter.clone());
        let backend = ratatui::backend::TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend)?;
        let mut entered = false;
        for _ in 0..ticks {
            if !entered {
                if let Some(id) = &enter_id {
                    entered = auto_enter(&mut state, &id.clone());
                } else {
                    entered = true;
                }
            }
            terminal.draw(|f| ui(f, &mut state))?;
            drain_load_msgs(&mut state);
            pump_tick(&mut state);
            std::thread::sleep(Duration::from_millis(200));
        }
        if env_flag("CATALOG_TUI_SMOKE_SUMMARY") {
            let view = match state.view {
                View::Menu => "Menu",
                View::Form => "Form",
            };
            let summary = serde_json::json!({
                "ok": true,
                "view": view,
                "screen_open": state.content.is_some(),
                "result_present": state.last_result.is_some(),
            });
            println!("{summary}");
        }
        return Ok(());
    }

    if let Some(id) = state.config.auto_enter.clone() {
        auto_enter(&mut state, &id);
    }

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();
    let res = loop {
        terminal.draw(|f| ui(f, &mut state))?;
        drain_load_msgs(&mut state);
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key(&mut state, key) {
                    break Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            pump_tick(&mut state);
            last_tick = Instant::now();
        }
    };
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}
