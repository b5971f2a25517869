use std::cell::RefCell;
use std::rc::Rc;

use weft_core::{Description, ListModel, Member, Params, PropertyModel, Value};
use weft_runtime::{
    BuildError, ComponentRegistry, Dispatcher, Handler, HandlerContext, HandlerError, HandlerRef,
    ResourceNotFoundError, Runtime, WidgetEvent, handler_ref, run_window,
};
use weft_widgets::WidgetRef;

// =============================================================================
// check_box bound to a property model
// =============================================================================

struct Settings {
    enabled_model: Rc<PropertyModel>,
    toggles: Vec<Value>,
}

impl Handler for Settings {
    fn member(&self, name: &str) -> Option<Member> {
        (name == "enabled_model").then(|| Member::object(self.enabled_model.clone()))
    }

    fn handle_event(&mut self, method: &str, event: &WidgetEvent) -> Result<(), HandlerError> {
        match method {
            "on_toggled" => {
                self.toggles.push(event.require("checked")?.clone());
                Ok(())
            }
            _ => Err(HandlerError::UnknownMethod(method.to_owned())),
        }
    }
}

const SETTINGS_JSON: &str = r#"{
    "type": "window",
    "title": "Settings",
    "children": [{
        "type": "check_box",
        "name": "enabled",
        "text": "Enabled",
        "checked": "@binding(enabled_model.value)",
        "events": {"on_checked_changed": "on_toggled"}
    }]
}"#;

#[test]
fn check_box_follows_its_model_both_ways() {
    let model = PropertyModel::shared(false);
    let settings = Rc::new(RefCell::new(Settings {
        enabled_model: model.clone(),
        toggles: Vec::new(),
    }));
    let dispatcher = Dispatcher::new();
    let description = Description::from_json(SETTINGS_JSON).unwrap();
    let window = run_window(&description, settings.clone(), &dispatcher).unwrap();
    let check = window.find("enabled").unwrap();
    assert_eq!(window.title().as_deref(), Some("Settings"));
    assert_eq!(check.get("checked"), Some(Value::Bool(false)));

    model.set_value(true);
    assert_eq!(check.get("checked"), Some(Value::Bool(true)));
    assert_eq!(check.get("check_state"), Some(Value::from("checked")));
    dispatcher.run_queued();
    assert!(settings.borrow().toggles.is_empty());

    check.click().unwrap();
    assert_eq!(model.value(), Value::Bool(false));
    check.click().unwrap();
    assert_eq!(model.value(), Value::Bool(true));
    dispatcher.run_queued();
    assert_eq!(
        settings.borrow().toggles,
        [Value::Bool(false), Value::Bool(true)]
    );
    assert!(dispatcher.take_notifications().is_empty());

    window.close().unwrap();
    assert_eq!(model.subscriber_count(), 0);
}

// =============================================================================
// Resource resolution
// =============================================================================

struct Plain;

impl Handler for Plain {}

#[test]
fn missing_resource_names_its_id() {
    let description = Description::new("window").with_child(
        Description::new("component").with_property("identifier", "ghost_panel"),
    );
    let err = run_window(&description, handler_ref(Plain), &Dispatcher::new()).unwrap_err();
    assert_eq!(
        err,
        BuildError::Resource(ResourceNotFoundError {
            id: "ghost_panel".into()
        })
    );
    assert!(err.to_string().contains("ghost_panel"));
}

#[test]
fn window_resources_shadow_the_registry() {
    let _global = ComponentRegistry::register_scoped(
        "banner",
        Description::new("text_label").with_property("text", "global"),
    );
    let description = Description::new("window")
        .with_resource(
            "banner",
            Description::new("text_label").with_property("text", "local"),
        )
        .with_child(Description::new("component").with_property("identifier", "banner"));
    let window = run_window(&description, handler_ref(Plain), &Dispatcher::new()).unwrap();
    let slot = window.content().unwrap();
    assert_eq!(slot.child(0).unwrap().get("text"), Some(Value::from("local")));
}

// =============================================================================
// Component events
// =============================================================================

struct Picker {
    context: Option<HandlerContext>,
    choices: Vec<Value>,
}

impl Handler for Picker {
    fn attach_context(&mut self, context: HandlerContext) {
        self.context = Some(context);
    }

    fn ui_view(&self) -> Option<Description> {
        Some(
            Description::new("list_box")
                .with_name("choices")
                .with_property("items", Value::List(self.choices.clone()))
                .with_event("on_item_selected", "picked"),
        )
    }

    fn handle_event(&mut self, method: &str, event: &WidgetEvent) -> Result<(), HandlerError> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| HandlerError::failed("not attached"))?;
        match method {
            "picked" => {
                let index = event.require("index")?.clone();
                let mut args = Params::new();
                args.insert("index".into(), index);
                context.emit("chosen", args).map(|_| ())
            }
            _ => Err(HandlerError::UnknownMethod(method.to_owned())),
        }
    }
}

#[derive(Default)]
struct Form {
    chosen: Vec<Value>,
}

impl Handler for Form {
    fn create_handler(&mut self, id: &str, params: &Params) -> Option<HandlerRef> {
        let choices = params.get("choices")?.as_list()?.to_vec();
        (id == "picker").then(|| {
            handler_ref(Picker {
                context: None,
                choices,
            })
        })
    }

    fn handle_event(&mut self, method: &str, event: &WidgetEvent) -> Result<(), HandlerError> {
        match method {
            "on_chosen" => {
                self.chosen.push(event.require("index")?.clone());
                Ok(())
            }
            _ => Err(HandlerError::UnknownMethod(method.to_owned())),
        }
    }
}

#[test]
fn component_events_reach_the_parent_handler() {
    let form = Rc::new(RefCell::new(Form::default()));
    let mut params = Params::new();
    params.insert(
        "choices".into(),
        Value::List(vec!["red".into(), "green".into()]),
    );
    let description = Description::new("window").with_child(
        Description::new("component")
            .with_property("identifier", "picker")
            .with_property("params", params)
            .with_event("chosen", "on_chosen"),
    );
    let dispatcher = Dispatcher::new();
    let window = run_window(&description, form.clone(), &dispatcher).unwrap();
    let list: WidgetRef = window.content().unwrap().child(0).unwrap();
    assert_eq!(list.get("items").and_then(|v| v.as_list().map(<[Value]>::len)), Some(2));

    let mut args = Params::new();
    args.insert("index".into(), Value::Int(1));
    list.emit_signal("on_item_selected", args).unwrap();
    dispatcher.run_queued();

    assert_eq!(form.borrow().chosen, [Value::Int(1)]);
    assert!(dispatcher.take_notifications().is_empty());
}

// =============================================================================
// Item lists
// =============================================================================

struct Inbox {
    messages: Rc<ListModel>,
}

impl Handler for Inbox {
    fn member(&self, name: &str) -> Option<Member> {
        (name == "messages").then(|| Member::List(self.messages.clone()))
    }

    fn get_resource(&self, id: &str, params: &Params) -> Option<Description> {
        if id != "message_row" {
            return None;
        }
        let text = format!(
            "{}: {}",
            params.get("index")?,
            params.get("item")?.to_display_string()
        );
        Some(Description::new("text_label").with_property("text", text))
    }
}

fn texts(widget: &WidgetRef) -> Vec<String> {
    widget
        .children()
        .iter()
        .filter_map(|c| c.get("text").map(|v| v.to_display_string()))
        .collect()
}

#[test]
fn item_rows_track_the_list_model() {
    let messages = Rc::new(ListModel::from_items(["hello", "world"]));
    let runtime = Runtime::new();
    let description = Description::new("window").with_child(
        Description::new("column")
            .with_property("items", "messages")
            .with_property("item_component_id", "message_row"),
    );
    let inbox = handler_ref(Inbox {
        messages: messages.clone(),
    });
    let window = runtime.run_window(&description, inbox).unwrap();
    let column = window.content().unwrap();
    assert_eq!(texts(&column), ["0: hello", "1: world"]);

    messages.push("again");
    messages.remove(0);
    assert_eq!(runtime.run_until_idle(), 2);
    // Item params are fixed when the row is built.
    assert_eq!(texts(&column), ["1: world", "2: again"]);

    window.close().unwrap();
    assert_eq!(messages.subscriber_count(), 0);
}
