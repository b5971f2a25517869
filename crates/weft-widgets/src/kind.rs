#![forbid(unsafe_code)]

//! The widget kind catalogue.
//!
//! Every widget has a [`WidgetKind`]. A kind carries a static table of the
//! properties it accepts ([`PropertySpec`]), the events it can raise
//! ([`EventSpec`]) and the shape of children it takes ([`ChildRule`]).
//! Properties shared by all kinds live in [`COMMON_PROPERTIES`].
//!
//! Extension kinds are described at runtime with a [`CustomKind`] and wrapped
//! in [`WidgetKind::Custom`].

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use weft_core::Value;

bitflags! {
    /// Per-property behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        /// The user can change the property; two-way bindings write back.
        const EDITABLE = 1 << 0;
        /// Computed from other properties of the same widget.
        const DERIVED = 1 << 1;
        /// Names a handler member (item lists); never bound.
        const PATH = 1 << 2;
    }
}

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropType {
    Bool,
    Int,
    Float,
    Text,
    List,
    Map,
    Any,
}

impl PropType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::List => "list",
            Self::Map => "map",
            Self::Any => "any",
        }
    }

    /// Normalize `value` to this type, or `None` if it does not fit.
    ///
    /// Null fits every type. Whole floats fit `Int`; integers widen to
    /// `Float`.
    #[must_use]
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (Self::Any, v) => Some(v),
            (Self::Bool, v @ Value::Bool(_)) => Some(v),
            (Self::Int, v @ Value::Int(_)) => Some(v),
            (Self::Int, Value::Float(f)) => Value::Float(f).as_int().map(Value::Int),
            (Self::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (Self::Float, v @ Value::Float(_)) => Some(v),
            (Self::Text, v @ Value::Str(_)) => Some(v),
            (Self::List, v @ Value::List(_)) => Some(v),
            (Self::Map, v @ Value::Map(_)) => Some(v),
            _ => None,
        }
    }
}

/// Initial value of a property on a freshly constructed widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initial {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'static str),
    EmptyList,
}

impl Initial {
    #[must_use]
    pub fn to_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::Float(f) => Value::Float(f),
            Self::Text(s) => Value::from(s),
            Self::EmptyList => Value::List(Vec::new()),
        }
    }
}

/// One property a kind accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub ty: PropType,
    pub initial: Initial,
    pub flags: PropertyFlags,
}

impl PropertySpec {
    pub const fn new(name: &'static str, ty: PropType, initial: Initial) -> Self {
        Self {
            name,
            ty,
            initial,
            flags: PropertyFlags::empty(),
        }
    }

    pub const fn editable(name: &'static str, ty: PropType, initial: Initial) -> Self {
        Self {
            name,
            ty,
            initial,
            flags: PropertyFlags::EDITABLE,
        }
    }

    const fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub const fn is_editable(&self) -> bool {
        self.flags.contains(PropertyFlags::EDITABLE)
    }

    #[must_use]
    pub const fn is_derived(&self) -> bool {
        self.flags.contains(PropertyFlags::DERIVED)
    }

    #[must_use]
    pub const fn is_path(&self) -> bool {
        self.flags.contains(PropertyFlags::PATH)
    }
}

/// What raises an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A user edit of the named property.
    Property(&'static str),
    /// An explicit action such as a click or a key press.
    Action,
}

/// One event a kind can raise, with the names of its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub trigger: Trigger,
    pub args: &'static [&'static str],
}

impl EventSpec {
    pub const fn on_edit(
        name: &'static str,
        property: &'static str,
        args: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            trigger: Trigger::Property(property),
            args,
        }
    }

    pub const fn action(name: &'static str, args: &'static [&'static str]) -> Self {
        Self {
            name,
            trigger: Trigger::Action,
            args,
        }
    }
}

/// Children a kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRule {
    None,
    Any,
    ExactlyOne,
    /// Only `tab` nodes.
    Tabs,
}

// ---------------------------------------------------------------------------
// Property tables
// ---------------------------------------------------------------------------

use Initial as I;
use PropType as T;
use PropertySpec as P;

/// Properties every kind accepts.
pub const COMMON_PROPERTIES: &[PropertySpec] = &[
    P::new("enabled", T::Bool, I::Bool(true)),
    P::new("visible", T::Bool, I::Bool(true)),
    P::new("tool_tip", T::Text, I::Null),
    P::new("background_color", T::Text, I::Null),
    P::new("border_color", T::Text, I::Null),
    P::new("color", T::Text, I::Null),
    P::new("font", T::Text, I::Null),
    P::new("widget_id", T::Text, I::Null),
];

const BOX_PROPERTIES: &[PropertySpec] = &[
    P::new("spacing", T::Int, I::Int(0)),
    P::new("margin", T::Int, I::Int(0)),
    P::new("items", T::Text, I::Null).with_flags(PropertyFlags::PATH),
    P::new("item_component_id", T::Text, I::Null),
];

const STACK_PROPERTIES: &[PropertySpec] = &[
    P::new("current_index", T::Int, I::Int(0)),
    P::new("items", T::Text, I::Null).with_flags(PropertyFlags::PATH),
    P::new("item_component_id", T::Text, I::Null),
];

const SPACING_PROPERTIES: &[PropertySpec] = &[P::new("size", T::Int, I::Int(0))];

const LABEL_PROPERTIES: &[PropertySpec] = &[
    P::new("text", T::Text, I::Text("")),
    P::new("word_wrap", T::Bool, I::Bool(false)),
    P::new("text_alignment_horizontal", T::Text, I::Null),
    P::new("text_alignment_vertical", T::Text, I::Null),
];

const IMAGE_PROPERTIES: &[PropertySpec] = &[P::new("image", T::Any, I::Null)];

const LINE_EDIT_PROPERTIES: &[PropertySpec] = &[
    P::editable("text", T::Text, I::Text("")),
    P::new("placeholder_text", T::Text, I::Null),
    P::new("clear_button_enabled", T::Bool, I::Bool(false)),
    P::new("editable", T::Bool, I::Bool(true)),
];

const TEXT_EDIT_PROPERTIES: &[PropertySpec] = &[
    P::editable("text", T::Text, I::Text("")),
    P::new("placeholder_text", T::Text, I::Null),
    P::new("editable", T::Bool, I::Bool(true)),
    P::new("word_wrap", T::Bool, I::Bool(true)),
];

const PUSH_BUTTON_PROPERTIES: &[PropertySpec] = &[
    P::new("text", T::Text, I::Text("")),
    P::new("icon", T::Any, I::Null),
];

const CHECK_BOX_PROPERTIES: &[PropertySpec] = &[
    P::new("text", T::Text, I::Text("")),
    P::editable("checked", T::Bool, I::Bool(false)),
    P::editable("check_state", T::Text, I::Text("unchecked")),
    P::new("tristate", T::Bool, I::Bool(false)),
];

const COMBO_BOX_PROPERTIES: &[PropertySpec] = &[
    P::new("items", T::List, I::EmptyList),
    P::editable("current_index", T::Int, I::Null),
    P::new("current_item", T::Any, I::Null).with_flags(PropertyFlags::DERIVED),
];

const RADIO_BUTTON_PROPERTIES: &[PropertySpec] = &[
    P::new("text", T::Text, I::Text("")),
    P::new("value", T::Any, I::Null),
    P::editable("group_value", T::Any, I::Null),
    P::new("checked", T::Bool, I::Bool(false)).with_flags(PropertyFlags::DERIVED),
];

const SLIDER_PROPERTIES: &[PropertySpec] = &[
    P::editable("value", T::Int, I::Int(0)),
    P::new("minimum", T::Int, I::Int(0)),
    P::new("maximum", T::Int, I::Int(100)),
];

const PROGRESS_BAR_PROPERTIES: &[PropertySpec] = &[
    P::new("value", T::Int, I::Int(0)),
    P::new("minimum", T::Int, I::Int(0)),
    P::new("maximum", T::Int, I::Int(100)),
];

const DIVIDER_PROPERTIES: &[PropertySpec] =
    &[P::new("orientation", T::Text, I::Text("horizontal"))];

const TABS_PROPERTIES: &[PropertySpec] = &[P::editable("current_index", T::Int, I::Int(0))];

const TAB_PROPERTIES: &[PropertySpec] = &[P::new("label", T::Text, I::Null)];

const GROUP_PROPERTIES: &[PropertySpec] = &[P::new("title", T::Text, I::Null)];

const LIST_BOX_PROPERTIES: &[PropertySpec] = &[
    P::new("items", T::List, I::EmptyList),
    P::editable("current_index", T::Int, I::Null),
    P::new("current_item", T::Any, I::Null).with_flags(PropertyFlags::DERIVED),
];

const COMPONENT_PROPERTIES: &[PropertySpec] = &[
    P::new("identifier", T::Text, I::Null),
    P::new("params", T::Map, I::Null),
    P::new("optional", T::Bool, I::Bool(false)),
];

const WINDOW_PROPERTIES: &[PropertySpec] = &[
    P::new("title", T::Text, I::Null),
    P::new("margin", T::Int, I::Int(0)),
];

// ---------------------------------------------------------------------------
// Event tables
// ---------------------------------------------------------------------------

use EventSpec as E;

const LINE_EDIT_EVENTS: &[EventSpec] = &[
    E::action("on_editing_finished", &["text"]),
    E::on_edit("on_text_edited", "text", &["text"]),
    E::action("on_return_pressed", &[]),
    E::action("on_escape_pressed", &[]),
];

const TEXT_EDIT_EVENTS: &[EventSpec] = &[
    E::on_edit("on_text_edited", "text", &["text"]),
    E::action("on_return_pressed", &[]),
    E::action("on_escape_pressed", &[]),
];

const PUSH_BUTTON_EVENTS: &[EventSpec] = &[E::action("on_clicked", &[])];

const CHECK_BOX_EVENTS: &[EventSpec] = &[
    E::on_edit("on_checked_changed", "checked", &["checked"]),
    E::on_edit("on_check_state_changed", "check_state", &["check_state"]),
];

const INDEX_EVENTS: &[EventSpec] = &[E::on_edit(
    "on_current_index_changed",
    "current_index",
    &["current_index"],
)];

const RADIO_BUTTON_EVENTS: &[EventSpec] = &[E::action("on_clicked", &[])];

const SLIDER_EVENTS: &[EventSpec] = &[
    E::on_edit("on_value_changed", "value", &["value"]),
    E::action("on_slider_moved", &["value"]),
    E::action("on_slider_pressed", &[]),
    E::action("on_slider_released", &[]),
];

const LIST_BOX_EVENTS: &[EventSpec] = &[
    E::on_edit("on_current_index_changed", "current_index", &["current_index"]),
    E::action("on_item_selected", &["index"]),
    E::action("on_return_pressed", &[]),
    E::action("on_escape_pressed", &[]),
];

// ---------------------------------------------------------------------------
// WidgetKind
// ---------------------------------------------------------------------------

/// A widget kind defined outside the built-in catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomKind {
    name: String,
    properties: Vec<PropertySpec>,
    events: Vec<EventSpec>,
    children: ChildRule,
}

impl CustomKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            events: Vec::new(),
            children: ChildRule::None,
        }
    }

    #[must_use]
    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    #[must_use]
    pub fn event(mut self, spec: EventSpec) -> Self {
        self.events.push(spec);
        self
    }

    #[must_use]
    pub fn children(mut self, rule: ChildRule) -> Self {
        self.children = rule;
        self
    }

    #[must_use]
    pub fn into_kind(self) -> WidgetKind {
        WidgetKind::Custom(Rc::new(self))
    }
}

/// The closed set of widget kinds, plus registered extensions.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetKind {
    Column,
    Row,
    Spacing,
    Stretch,
    TextLabel,
    Image,
    LineEdit,
    TextEdit,
    PushButton,
    CheckBox,
    ComboBox,
    RadioButton,
    Slider,
    ProgressBar,
    Divider,
    Tabs,
    Tab,
    Stack,
    ScrollArea,
    Group,
    ListBox,
    /// Placeholder for resource-resolved content.
    Component,
    Window,
    ModelessDialog,
    Custom(Rc<CustomKind>),
}

impl WidgetKind {
    /// Every built-in kind.
    pub const BUILTIN: [WidgetKind; 24] = [
        Self::Column,
        Self::Row,
        Self::Spacing,
        Self::Stretch,
        Self::TextLabel,
        Self::Image,
        Self::LineEdit,
        Self::TextEdit,
        Self::PushButton,
        Self::CheckBox,
        Self::ComboBox,
        Self::RadioButton,
        Self::Slider,
        Self::ProgressBar,
        Self::Divider,
        Self::Tabs,
        Self::Tab,
        Self::Stack,
        Self::ScrollArea,
        Self::Group,
        Self::ListBox,
        Self::Component,
        Self::Window,
        Self::ModelessDialog,
    ];

    /// Type name as used in descriptions.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Custom(custom) => &custom.name,
            builtin => builtin.builtin_name().unwrap_or_default(),
        }
    }

    /// Type name of a built-in kind; `None` for custom kinds.
    #[must_use]
    pub fn builtin_name(&self) -> Option<&'static str> {
        let name = match self {
            Self::Column => "column",
            Self::Row => "row",
            Self::Spacing => "spacing",
            Self::Stretch => "stretch",
            Self::TextLabel => "text_label",
            Self::Image => "image",
            Self::LineEdit => "line_edit",
            Self::TextEdit => "text_edit",
            Self::PushButton => "push_button",
            Self::CheckBox => "check_box",
            Self::ComboBox => "combo_box",
            Self::RadioButton => "radio_button",
            Self::Slider => "slider",
            Self::ProgressBar => "progress_bar",
            Self::Divider => "divider",
            Self::Tabs => "tabs",
            Self::Tab => "tab",
            Self::Stack => "stack",
            Self::ScrollArea => "scroll_area",
            Self::Group => "group",
            Self::ListBox => "list_box",
            Self::Component => "component",
            Self::Window => "window",
            Self::ModelessDialog => "modeless_dialog",
            Self::Custom(_) => return None,
        };
        Some(name)
    }

    /// Look up a built-in kind by type name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::BUILTIN.into_iter().find(|kind| kind.name() == name)
    }

    /// Kind-specific properties (without [`COMMON_PROPERTIES`]).
    #[must_use]
    pub fn own_properties(&self) -> &[PropertySpec] {
        match self {
            Self::Column | Self::Row => BOX_PROPERTIES,
            Self::Stack => STACK_PROPERTIES,
            Self::Spacing => SPACING_PROPERTIES,
            Self::Stretch | Self::ScrollArea => &[],
            Self::TextLabel => LABEL_PROPERTIES,
            Self::Image => IMAGE_PROPERTIES,
            Self::LineEdit => LINE_EDIT_PROPERTIES,
            Self::TextEdit => TEXT_EDIT_PROPERTIES,
            Self::PushButton => PUSH_BUTTON_PROPERTIES,
            Self::CheckBox => CHECK_BOX_PROPERTIES,
            Self::ComboBox => COMBO_BOX_PROPERTIES,
            Self::RadioButton => RADIO_BUTTON_PROPERTIES,
            Self::Slider => SLIDER_PROPERTIES,
            Self::ProgressBar => PROGRESS_BAR_PROPERTIES,
            Self::Divider => DIVIDER_PROPERTIES,
            Self::Tabs => TABS_PROPERTIES,
            Self::Tab => TAB_PROPERTIES,
            Self::Group => GROUP_PROPERTIES,
            Self::ListBox => LIST_BOX_PROPERTIES,
            Self::Component => COMPONENT_PROPERTIES,
            Self::Window | Self::ModelessDialog => WINDOW_PROPERTIES,
            Self::Custom(custom) => &custom.properties,
        }
    }

    /// All properties: kind-specific first, then common ones.
    pub fn properties(&self) -> impl Iterator<Item = &PropertySpec> {
        self.own_properties().iter().chain(COMMON_PROPERTIES)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties().find(|spec| spec.name == name)
    }

    #[must_use]
    pub fn events(&self) -> &[EventSpec] {
        match self {
            Self::LineEdit => LINE_EDIT_EVENTS,
            Self::TextEdit => TEXT_EDIT_EVENTS,
            Self::PushButton => PUSH_BUTTON_EVENTS,
            Self::CheckBox => CHECK_BOX_EVENTS,
            Self::ComboBox | Self::Tabs => INDEX_EVENTS,
            Self::RadioButton => RADIO_BUTTON_EVENTS,
            Self::Slider => SLIDER_EVENTS,
            Self::ListBox => LIST_BOX_EVENTS,
            Self::Custom(custom) => &custom.events,
            _ => &[],
        }
    }

    #[must_use]
    pub fn event(&self, name: &str) -> Option<&EventSpec> {
        self.events().iter().find(|spec| spec.name == name)
    }

    /// Events raised by a user edit of `property`.
    pub fn events_for_property<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a EventSpec> {
        self.events()
            .iter()
            .filter(move |spec| matches!(spec.trigger, Trigger::Property(p) if p == property))
    }

    #[must_use]
    pub fn child_rule(&self) -> ChildRule {
        match self {
            Self::Column | Self::Row | Self::Stack => ChildRule::Any,
            Self::ScrollArea | Self::Group | Self::Tab | Self::Window | Self::ModelessDialog => {
                ChildRule::ExactlyOne
            }
            Self::Tabs => ChildRule::Tabs,
            Self::Custom(custom) => custom.children,
            _ => ChildRule::None,
        }
    }

    /// Kinds that may only appear as the root of a window or dialog.
    #[must_use]
    pub const fn is_root_only(&self) -> bool {
        matches!(self, Self::Window | Self::ModelessDialog)
    }

    /// Kinds whose events map is forwarded from a sub-handler rather than
    /// checked against a table.
    #[must_use]
    pub const fn forwards_events(&self) -> bool {
        matches!(self, Self::Component)
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
