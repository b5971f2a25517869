use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use weft_core::{BindingExpr, Description, Member, PropertyModel, Value};
use weft_runtime::{Builder, Dispatcher, Handler, HandlerRef};

// =============================================================================
// Capturing layer
// =============================================================================

#[derive(Debug, Clone, Default)]
struct Record {
    level: Option<Level>,
    message: String,
    error: String,
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<Record>>>);

impl Capture {
    fn warnings(&self) -> Vec<Record> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level == Some(Level::WARN))
            .cloned()
            .collect()
    }
}

impl Visit for Record {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "error" => self.error = format!("{value:?}"),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let mut record = Record {
            level: Some(*event.metadata().level()),
            ..Record::default()
        };
        event.record(&mut record);
        self.0.lock().unwrap().push(record);
    }
}

// =============================================================================
// Converter failures
// =============================================================================

struct Counter {
    count: Rc<PropertyModel>,
}

impl Handler for Counter {
    fn member(&self, name: &str) -> Option<Member> {
        (name == "count").then(|| Member::object(self.count.clone()))
    }
}

#[test]
fn converter_failures_are_logged_and_dropped() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    tracing::subscriber::with_default(subscriber, || {
        let count = PropertyModel::shared(3);
        let handler: HandlerRef = Rc::new(RefCell::new(Counter {
            count: count.clone(),
        }));
        let expr = BindingExpr::new("count.value").with_converter("int_to_string");
        let node = Description::new("line_edit").with_binding("text", &expr);
        let edit = Builder::new()
            .build(&node, &handler, &Dispatcher::new())
            .unwrap();
        assert_eq!(edit.get("text"), Some(Value::from("3")));
        assert!(capture.warnings().is_empty());

        edit.edit("text", "loud").unwrap();
        assert_eq!(count.value(), Value::Int(3));

        count.set_value("seven");
        assert_eq!(edit.get("text"), Some(Value::from("loud")));

        let warnings = capture.warnings();
        let messages: Vec<&str> = warnings.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["dropping widget edit", "dropping model update"]);
        for record in &warnings {
            assert!(record.error.contains("int_to_string"), "{record:?}");
        }

        count.set_value(9);
        assert_eq!(edit.get("text"), Some(Value::from("9")));
        assert_eq!(capture.warnings().len(), 2);
    });
}
