//! Immediate-mode control reconciliation
//!
//! Scripts ask for sliders and text displays every frame. [`ControlReconciler`]
//! matches those requests against the widgets created on earlier frames so a widget
//! keeps its identity (and the user's edits) for as long as the script keeps
//! requesting it, and removes widgets the script stopped asking for.

use std::collections::HashMap;

/// Opaque handle to a widget owned by a [`ControlHost`]
pub type WidgetId = u64;

/// Kind of an interactive control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    FloatSlider,
    IntSlider,
    Text,
}

/// Everything a host needs to create a control
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSpec {
    FloatSlider { name: String, min: f64, max: f64, value: f64, step: f64 },
    IntSlider { name: String, min: f64, max: f64, value: f64, step: f64 },
    Text { text: String },
}

/// Step of float sliders
pub const FLOAT_SLIDER_STEP: f64 = 0.001;
/// Step of int sliders
pub const INT_SLIDER_STEP: f64 = 1.0;

impl ControlSpec {
    pub fn float_slider(name: impl Into<String>, min: f64, max: f64, value: f64) -> Self {
        Self::FloatSlider {
            name: name.into(),
            min,
            max,
            value,
            step: FLOAT_SLIDER_STEP,
        }
    }

    pub fn int_slider(name: impl Into<String>, min: f64, max: f64, value: f64) -> Self {
        Self::IntSlider {
            name: name.into(),
            min,
            max,
            value,
            step: INT_SLIDER_STEP,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            Self::FloatSlider { .. } => ControlKind::FloatSlider,
            Self::IntSlider { .. } => ControlKind::IntSlider,
            Self::Text { .. } => ControlKind::Text,
        }
    }

    /// Name of the control; text displays are anonymous
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::FloatSlider { name, .. } | Self::IntSlider { name, .. } => Some(name),
            Self::Text { .. } => None,
        }
    }

    /// Initial value of a slider
    pub fn initial_value(&self) -> Option<f64> {
        match self {
            Self::FloatSlider { value, .. } | Self::IntSlider { value, .. } => Some(*value),
            Self::Text { .. } => None,
        }
    }
}

/// UI toolkit side of the control reconciliation
pub trait ControlHost {
    /// Creates a widget displayed at `position` among the current widgets
    fn create(&mut self, spec: &ControlSpec, position: usize) -> WidgetId;

    /// Removes a widget
    fn remove(&mut self, widget: WidgetId);

    /// Current value of a slider widget, as possibly edited by the user
    fn read_value(&self, widget: WidgetId) -> Option<f64>;

    /// Replaces the text shown by a text widget
    fn set_text(&mut self, widget: WidgetId, text: &str);
}

#[derive(Debug)]
struct Control {
    kind: ControlKind,
    name: Option<String>,
    widget: WidgetId,
    live: bool,
}

impl Control {
    fn matches(&self, spec: &ControlSpec) -> bool {
        self.kind == spec.kind() && (self.kind == ControlKind::Text || self.name.as_deref() == spec.name())
    }
}

/// Position-biased diff of per-frame control requests against existing widgets
#[derive(Debug, Default)]
pub struct ControlReconciler {
    controls: Vec<Control>,
    cursor: usize,
}

impl ControlReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches one request against the control at the cursor, creating a control if needed
    ///
    /// # Arguments
    /// * `host` - Host that owns the widgets
    /// * `spec` - The requested control
    ///
    /// # Returns
    /// The widget serving this request
    pub fn request<H: ControlHost + ?Sized>(&mut self, host: &mut H, spec: &ControlSpec) -> WidgetId {
        if let Some(control) = self.controls.get_mut(self.cursor).filter(|control| control.matches(spec)) {
            control.live = true;
            self.cursor += 1;
            return control.widget;
        }

        let widget = host.create(spec, self.cursor);
        tracing::debug!(kind = ?spec.kind(), name = ?spec.name(), position = self.cursor, "created control");
        self.controls.insert(
            self.cursor,
            Control {
                kind: spec.kind(),
                name: spec.name().map(str::to_string),
                widget,
                live: true,
            },
        );
        self.cursor += 1;
        widget
    }

    /// Finishes a frame: removes every control that was not requested and resets liveness
    pub fn end_frame<H: ControlHost + ?Sized>(&mut self, host: &mut H) {
        self.controls.retain_mut(|control| {
            if control.live {
                control.live = false;
                return true;
            }
            tracing::debug!(kind = ?control.kind, name = ?control.name, "removed control");
            host.remove(control.widget);
            false
        });
        self.cursor = 0;
    }

    /// Removes every control
    pub fn clear<H: ControlHost + ?Sized>(&mut self, host: &mut H) {
        for control in self.controls.drain(..) {
            host.remove(control.widget);
        }
        self.cursor = 0;
    }

    /// Number of controls currently alive
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Widget ids in display order
    pub fn widgets(&self) -> impl Iterator<Item = WidgetId> + '_ {
        self.controls.iter().map(|control| control.widget)
    }
}

/// In-memory control host for headless runs
///
/// Slider values start at the value they were created with unless an override was
/// registered for the slider's name.
#[derive(Debug, Default)]
pub struct HeadlessControls {
    next_widget: WidgetId,
    widgets: HashMap<WidgetId, HeadlessWidget>,
    overrides: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
struct HeadlessWidget {
    spec: ControlSpec,
    value: Option<f64>,
    text: Option<String>,
}

impl HeadlessControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the slider called `name` to `value`, clamped to the slider's range
    pub fn set_override(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        for widget in self.widgets.values_mut() {
            if widget.spec.name() == Some(name.as_str()) {
                widget.value = Some(clamp_to_spec(&widget.spec, value));
            }
        }
        self.overrides.insert(name, value);
    }

    /// Text currently shown by a text widget
    pub fn text(&self, widget: WidgetId) -> Option<&str> {
        self.widgets.get(&widget).and_then(|w| w.text.as_deref())
    }

    /// Number of widgets currently displayed
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}

fn clamp_to_spec(spec: &ControlSpec, value: f64) -> f64 {
    match spec {
        ControlSpec::FloatSlider { min, max, .. } => value.clamp(*min, (*max).max(*min)),
        ControlSpec::IntSlider { min, max, .. } => value.round().clamp(*min, (*max).max(*min)),
        ControlSpec::Text { .. } => value,
    }
}

impl ControlHost for HeadlessControls {
    fn create(&mut self, spec: &ControlSpec, _position: usize) -> WidgetId {
        let widget = self.next_widget;
        self.next_widget += 1;

        let value = spec
            .initial_value()
            .map(|initial| spec.name().and_then(|name| self.overrides.get(name)).map_or(initial, |&v| clamp_to_spec(spec, v)));
        let text = match spec {
            ControlSpec::Text { text } => Some(text.clone()),
            _ => None,
        };
        self.widgets.insert(widget, HeadlessWidget { spec: spec.clone(), value, text });
        widget
    }

    fn remove(&mut self, widget: WidgetId) {
        self.widgets.remove(&widget);
    }

    fn read_value(&self, widget: WidgetId) -> Option<f64> {
        self.widgets.get(&widget).and_then(|w| w.value)
    }

    fn set_text(&mut self, widget: WidgetId, text: &str) {
        if let Some(w) = self.widgets.get_mut(&widget) {
            w.text = Some(text.to_string());
        }
    }
}
