use crate::model::ScreenSpec;
use crate::nav::keys;
use crate::services::backend;
use crate::ui::{AppState, LoadOutcome, Pane, ToastLevel, View};
use crate::widgets::form::Editor;
use crate::widgets::form_widget::FormWidget;
use crate::widgets::ref_select::FetchRequest;
use serde_json::Value as JsonValue;

pub enum AppMsg {
    EnterScreen(ScreenSpec),
    LoadedEntity {
        key: String,
        outcome: Result<LoadOutcome, String>,
    },
    LoadedOptions {
        key: String,
        outcome: Result<LoadOutcome, String>,
    },
    LoadedPersist {
        key: String,
        outcome: Result<LoadOutcome, String>,
    },
}

#[derive(Debug)]
pub enum Effect {
    FetchEntity {
        entity: String,
        id: String,
        key: String,
    },
    LoadOptions {
        field: String,
        request: FetchRequest,
    },
    Persist {
        entity: String,
        entity_id: Option<String>,
        payload: JsonValue,
        key: String,
    },
    ShowToast {
        text: String,
        level: ToastLevel,
        seconds: u64,
    },
    CloseScreen,
}

pub(crate) fn form_widget_mut(state: &mut AppState) -> Option<&mut FormWidget> {
    state
        .content
        .as_mut()?
        .as_any_mut()
        .downcast_mut::<FormWidget>()
}

pub fn update(state: &mut AppState, msg: AppMsg) -> Vec<Effect> {
    let mut effects: Vec<Effect> = Vec::new();
    match msg {
        AppMsg::EnterScreen(screen) => {
            state.dbg(format!("enter screen {}", screen.id));
            let fw = FormWidget::new(screen);
            if let Some(eff) = fw.fetch_effect() {
                effects.push(eff);
            }
            state.content = Some(Box::new(fw));
            state.view = View::Form;
            state.focus = Pane::Content;
        }
        AppMsg::LoadedEntity { key, outcome } => {
            state.status_text = None;
            if let Some(fw) = form_widget_mut(state) {
                // A stale load for a screen that was already left.
                if fw.entity_load_key() != key {
                    return effects;
                }
                match outcome {
                    Ok(LoadOutcome::Entity(data)) => {
                        fw.session.mark_loaded(&mut fw.form, &data);
                        // Resolve labels for pre-existing reference values.
                        for f in &mut fw.form.fields {
                            if let Editor::Reference(st) = &mut f.editor {
                                if let Some(request) = st.resolve_label() {
                                    effects.push(Effect::LoadOptions {
                                        field: f.spec.name.clone(),
                                        request,
                                    });
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        fw.session.mark_data_error(e.clone());
                        effects.push(Effect::ShowToast {
                            text: e,
                            level: ToastLevel::Error,
                            seconds: 3,
                        });
                    }
                }
            }
        }
        AppMsg::LoadedOptions { key, outcome } => {
            let Some((field, version)) = keys::parse_ref_key(&key).map(|(f, v)| (f.to_string(), v))
            else {
                return effects;
            };
            if let Some(fw) = form_widget_mut(state) {
                if let Some(fld) = fw.form.field_mut(&field) {
                    if let Editor::Reference(st) = &mut fld.editor {
                        match outcome {
                            Ok(LoadOutcome::Options {
                                version: v, items, ..
                            }) => st.apply(v, items),
                            Ok(_) => {}
                            Err(_) => st.apply_error(version),
                        }
                    }
                }
            }
        }
        AppMsg::LoadedPersist { key, outcome } => {
            state.status_text = None;
            let tick = state.tick;
            let mut store: Option<JsonValue> = None;
            if let Some(fw) = form_widget_mut(state) {
                if fw.submit_load_key() == key {
                    match outcome {
                        Ok(LoadOutcome::Persisted(env)) => {
                            if backend::envelope_ok(&env) {
                                fw.session.submit_succeeded(&fw.form, tick);
                                effects.push(Effect::ShowToast {
                                    text: "Saved".into(),
                                    level: ToastLevel::Success,
                                    seconds: 2,
                                });
                                store = Some(env);
                            } else {
                                for (fname, msg) in backend::envelope_field_errors(&env) {
                                    if let Some(fld) = fw.form.field_mut(&fname) {
                                        fld.error = Some(msg);
                                    }
                                }
                                let msg = backend::envelope_error_message(&env);
                                fw.session.submit_failed(msg.clone(), tick);
                                effects.push(Effect::ShowToast {
                                    text: msg,
                                    level: ToastLevel::Error,
                                    seconds: 3,
                                });
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            fw.session.submit_failed(e.clone(), tick);
                            effects.push(Effect::ShowToast {
                                text: e,
                                level: ToastLevel::Error,
                                seconds: 3,
                            });
                        }
                    }
                }
            }
            if let Some(env) = store {
                state.last_result = Some(env);
            }
        }
    }
    effects
}

#[cfg(test)]
mod tests;
