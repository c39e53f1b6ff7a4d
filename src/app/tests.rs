use super::*;
use crate::model::{FieldSpec, ReferenceConfig, ScreenMode};
use crate::session::SessionStatus;
use serde_json::json;

fn create_screen() -> ScreenSpec {
    ScreenSpec {
        id: "brand-new".into(),
        title: "New Brand".into(),
        entity: "brands".into(),
        mode: ScreenMode::Create,
        fields: vec![FieldSpec {
            name: "title".into(),
            required: true,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn update_screen() -> ScreenSpec {
    ScreenSpec {
        id: "brand-edit".into(),
        title: "Edit Brand".into(),
        mode: ScreenMode::Update,
        entity_id: Some("7".into()),
        ..create_screen()
    }
}

fn widget(state: &mut AppState) -> &mut FormWidget {
    form_widget_mut(state).expect("form widget mounted")
}

#[test]
fn enter_create_screen_is_ready_immediately() {
    let mut st = AppState::default();
    let effects = update(&mut st, AppMsg::EnterScreen(create_screen()));
    assert!(effects.is_empty());
    assert!(matches!(st.view, View::Form));
    assert_eq!(widget(&mut st).session.status, SessionStatus::Ready);
}

#[test]
fn enter_update_screen_requests_the_entity() {
    let mut st = AppState::default();
    let effects = update(&mut st, AppMsg::EnterScreen(update_screen()));
    assert_eq!(effects.len(), 1);
    match &effects[0] {
        Effect::FetchEntity { entity, id, key } => {
            assert_eq!(entity, "brands");
            assert_eq!(id, "7");
            assert_eq!(key, "entity:brand-edit");
        }
        other => panic!("unexpected effect: {other:?}"),
    }
    assert_eq!(widget(&mut st).session.status, SessionStatus::Loading);
}

#[test]
fn loaded_entity_populates_values() {
    let mut st = AppState::default();
    let _ = update(&mut st, AppMsg::EnterScreen(update_screen()));
    let _ = update(
        &mut st,
        AppMsg::LoadedEntity {
            key: "entity:brand-edit".into(),
            outcome: Ok(LoadOutcome::Entity(json!({"title": "Acme"}))),
        },
    );
    let fw = widget(&mut st);
    assert_eq!(fw.session.status, SessionStatus::Ready);
    assert_eq!(fw.form.field("title").unwrap().value(), json!("Acme"));
    assert!(!fw.form.dirty);
}

#[test]
fn failed_entity_load_blocks_the_screen() {
    let mut st = AppState::default();
    let _ = update(&mut st, AppMsg::EnterScreen(update_screen()));
    let effects = update(
        &mut st,
        AppMsg::LoadedEntity {
            key: "entity:brand-edit".into(),
            outcome: Err("backend unreachable".into()),
        },
    );
    assert!(matches!(
        widget(&mut st).session.status,
        SessionStatus::DataError { .. }
    ));
    assert!(matches!(effects[0], Effect::ShowToast { .. }));
}

#[test]
fn persist_error_envelope_maps_field_errors() {
    let mut st = AppState::default();
    let _ = update(&mut st, AppMsg::EnterScreen(update_screen()));
    let _ = update(
        &mut st,
        AppMsg::LoadedEntity {
            key: "entity:brand-edit".into(),
            outcome: Ok(LoadOutcome::Entity(json!({"title": "Acme"}))),
        },
    );
    widget(&mut st).session.begin_submit();
    let env = json!({
        "ok": false,
        "error": {
            "message": "Update failed",
            "details": { "errors": [
                { "loc": ["payload", "title"], "msg": "Too short" }
            ]}
        }
    });
    let effects = update(
        &mut st,
        AppMsg::LoadedPersist {
            key: "submit:brand-edit".into(),
            outcome: Ok(LoadOutcome::Persisted(env)),
        },
    );
    let fw = widget(&mut st);
    assert_eq!(fw.form.fields[0].error.as_deref(), Some("Too short"));
    match &fw.session.status {
        SessionStatus::Error { message, .. } => assert_eq!(message, "Update failed"),
        other => panic!("unexpected status {other:?}"),
    }
    // Entered values stay put for a corrected resubmit.
    assert_eq!(fw.form.field("title").unwrap().value(), json!("Acme"));
    assert!(matches!(
        effects[0],
        Effect::ShowToast {
            level: ToastLevel::Error,
            ..
        }
    ));
}

#[test]
fn persist_transport_error_sets_the_banner() {
    let mut st = AppState::default();
    let _ = update(&mut st, AppMsg::EnterScreen(create_screen()));
    widget(&mut st).session.begin_submit();
    let _ = update(
        &mut st,
        AppMsg::LoadedPersist {
            key: "submit:brand-new".into(),
            outcome: Err("Update failed".into()),
        },
    );
    match &widget(&mut st).session.status {
        SessionStatus::Error { message, .. } => assert_eq!(message, "Update failed"),
        other => panic!("unexpected status {other:?}"),
    }
}

#[test]
fn persist_success_stores_the_response_and_toasts() {
    let mut st = AppState::default();
    st.tick = 40;
    let _ = update(&mut st, AppMsg::EnterScreen(create_screen()));
    widget(&mut st).session.begin_submit();
    let effects = update(
        &mut st,
        AppMsg::LoadedPersist {
            key: "submit:brand-new".into(),
            outcome: Ok(LoadOutcome::Persisted(json!({"ok": true, "data": {"id": 9}}))),
        },
    );
    assert!(matches!(
        effects[0],
        Effect::ShowToast {
            level: ToastLevel::Success,
            ..
        }
    ));
    assert!(matches!(
        widget(&mut st).session.status,
        SessionStatus::Success { .. }
    ));
    assert_eq!(st.last_result, Some(json!({"ok": true, "data": {"id": 9}})));
}

#[test]
fn option_pages_route_by_field_and_version() {
    let mut st = AppState::default();
    let screen = ScreenSpec {
        fields: vec![FieldSpec {
            name: "brand_id".into(),
            kind: crate::model::FieldKind::Reference,
            reference: Some(serde_yaml::from_str::<ReferenceConfig>("endpoint: brands").unwrap()),
            ..Default::default()
        }],
        ..create_screen()
    };
    let _ = update(&mut st, AppMsg::EnterScreen(screen));
    // Open the selector so a version is live.
    let (version, _req) = {
        let fw = widget(&mut st);
        if let Editor::Reference(sel) = &mut fw.form.fields[0].editor {
            let req = sel.open().expect("initial fetch");
            (req.version, req)
        } else {
            panic!("expected reference editor");
        }
    };
    // A completion for an older version is ignored.
    let _ = update(
        &mut st,
        AppMsg::LoadedOptions {
            key: crate::nav::keys::ref_key("brand_id", version - 1),
            outcome: Ok(LoadOutcome::Options {
                version: version - 1,
                page: 1,
                items: vec![crate::widgets::ref_select::Choice {
                    label: "Stale".into(),
                    value: "0".into(),
                }],
            }),
        },
    );
    {
        let fw = widget(&mut st);
        if let Editor::Reference(sel) = &fw.form.fields[0].editor {
            assert!(sel.options.is_empty());
        }
    }
    // The current version lands.
    let _ = update(
        &mut st,
        AppMsg::LoadedOptions {
            key: crate::nav::keys::ref_key("brand_id", version),
            outcome: Ok(LoadOutcome::Options {
                version,
                page: 1,
                items: vec![crate::widgets::ref_select::Choice {
                    label: "Acme".into(),
                    value: "1".into(),
                }],
            }),
        },
    );
    let fw = widget(&mut st);
    if let Editor::Reference(sel) = &fw.form.fields[0].editor {
        assert_eq!(sel.options.len(), 1);
        assert!(!sel.in_flight);
    }
}
