use std::cell::RefCell;
use std::rc::Rc;

use weft_core::{Description, Params, Value};
use weft_runtime::{
    Dispatcher, Handler, HandlerContext, HandlerError, HandlerRef, LifecycleError, WidgetEvent,
    handler_ref, run_window,
};
use weft_widgets::WidgetRef;

// =============================================================================
// Fixtures
// =============================================================================

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

/// Records lifecycle calls and checks that attach precedes init.
struct Panel {
    log: Log,
    widgets: Vec<String>,
    context: Option<HandlerContext>,
    expected: &'static [&'static str],
}

impl Panel {
    fn new(log: &Log, expected: &'static [&'static str]) -> Self {
        Self {
            log: log.clone(),
            widgets: Vec::new(),
            context: None,
            expected,
        }
    }
}

impl Handler for Panel {
    fn attach_widget(&mut self, name: &str, _: WidgetRef) {
        push(&self.log, format!("attach {name}"));
        self.widgets.push(name.to_owned());
    }

    fn attach_context(&mut self, context: HandlerContext) {
        self.context = Some(context);
    }

    fn init_handler(&mut self) {
        for name in self.expected {
            assert!(self.widgets.iter().any(|w| w == name), "{name} not attached");
        }
        assert!(self.context.is_some());
        push(&self.log, format!("init {}", self.expected.join(",")));
    }

    fn close(&mut self) {
        push(&self.log, format!("close {}", self.expected.join(",")));
    }

    fn handle_event(&mut self, method: &str, _: &WidgetEvent) -> Result<(), HandlerError> {
        push(&self.log, format!("event {method}"));
        match method {
            "quit" => {
                let context = self
                    .context
                    .as_ref()
                    .ok_or_else(|| HandlerError::failed("no context"))?;
                context.request_close().map_err(|e| HandlerError::failed(e.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Parent that hands the `detail` component its own handler.
struct Host {
    panel: Panel,
}

impl Handler for Host {
    fn attach_widget(&mut self, name: &str, widget: WidgetRef) {
        self.panel.attach_widget(name, widget);
    }
    fn attach_context(&mut self, context: HandlerContext) {
        self.panel.attach_context(context);
    }
    fn init_handler(&mut self) {
        self.panel.init_handler();
    }
    fn close(&mut self) {
        self.panel.close();
    }
    fn handle_event(&mut self, method: &str, event: &WidgetEvent) -> Result<(), HandlerError> {
        self.panel.handle_event(method, event)
    }
    fn create_handler(&mut self, id: &str, params: &Params) -> Option<HandlerRef> {
        if id != "detail" {
            return None;
        }
        push(&self.panel.log, format!("create {}", params.get("mode")?.to_display_string()));
        Some(handler_ref(Detail(Panel::new(&self.panel.log, &["caption"]))))
    }
}

struct Detail(Panel);

impl Handler for Detail {
    fn attach_widget(&mut self, name: &str, widget: WidgetRef) {
        self.0.attach_widget(name, widget);
    }
    fn attach_context(&mut self, context: HandlerContext) {
        self.0.attach_context(context);
    }
    fn init_handler(&mut self) {
        self.0.init_handler();
    }
    fn close(&mut self) {
        self.0.close();
    }
    fn ui_view(&self) -> Option<Description> {
        let caption = Description::new("text_label").with_name("caption");
        Some(Description::new("column").with_child(caption))
    }
}

fn main_window() -> Description {
    let mut params = Params::new();
    params.insert("mode".into(), Value::from("full"));
    Description::new("window").with_child(
        Description::new("column")
            .with_child(Description::new("line_edit").with_name("name"))
            .with_child(
                Description::new("push_button")
                    .with_name("quit")
                    .with_event("on_clicked", "quit"),
            )
            .with_child(
                Description::new("component")
                    .with_property("identifier", "detail")
                    .with_property("params", params),
            ),
    )
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn attach_precedes_init_across_nested_handlers() {
    let log: Log = Rc::default();
    let host = handler_ref(Host {
        panel: Panel::new(&log, &["name", "quit"]),
    });
    let window = run_window(&main_window(), host, &Dispatcher::new()).unwrap();
    assert!(window.is_shown());
    assert_eq!(
        *log.borrow(),
        [
            "create full",
            "attach name",
            "attach quit",
            "attach caption",
            "init caption",
            "init name,quit",
        ]
    );

    window.close().unwrap();
    assert_eq!(
        log.borrow()[6..],
        ["close caption".to_owned(), "close name,quit".to_owned()]
    );
    assert_eq!(window.close(), Err(LifecycleError::AlreadyClosed(window.tree_id())));
}

// =============================================================================
// Closing from inside a task
// =============================================================================

#[test]
fn request_close_from_an_event_is_deferred() {
    let log: Log = Rc::default();
    let host = handler_ref(Host {
        panel: Panel::new(&log, &["name", "quit"]),
    });
    let dispatcher = Dispatcher::new();
    let window = run_window(&main_window(), host, &dispatcher).unwrap();
    let quit = window.find("quit").unwrap();

    quit.click().unwrap();
    quit.click().unwrap();
    assert!(window.is_shown());
    dispatcher.run_queued();

    assert!(!window.is_shown());
    let log = log.borrow();
    // Both clicks were queued before the close request.
    assert_eq!(log.iter().filter(|e| *e == "event quit").count(), 2);
    assert_eq!(log.iter().filter(|e| *e == "close name,quit").count(), 1);
    assert!(log.ends_with(&["close caption".to_owned(), "close name,quit".to_owned()]));
    assert!(dispatcher.take_notifications().is_empty());
}

#[test]
fn queued_event_is_dropped_when_the_window_closes() {
    let log: Log = Rc::default();
    let host = handler_ref(Host {
        panel: Panel::new(&log, &["name", "quit"]),
    });
    let dispatcher = Dispatcher::new();
    let window = run_window(&main_window(), host, &dispatcher).unwrap();
    window.find("quit").unwrap().click().unwrap();
    assert_eq!(dispatcher.pending_count(), 1);

    window.close().unwrap();
    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(dispatcher.run_queued(), 0);
    assert!(!log.borrow().iter().any(|e| e.starts_with("event")));
    assert!(dispatcher.take_notifications().is_empty());
}

#[test]
fn disposer_outlives_the_window() {
    let log: Log = Rc::default();
    let host = handler_ref(Host {
        panel: Panel::new(&log, &["name", "quit"]),
    });
    let window = run_window(&main_window(), host, &Dispatcher::new()).unwrap();
    let disposer = window.disposer();
    drop(window);
    assert!(disposer.is_disposed());
    assert!(disposer.dispose().is_err());
}
