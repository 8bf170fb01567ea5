//! Per-editor session state fed back into script evaluation

use crate::script::{ContextInput, NamedValue, UniformValue};
use std::collections::{HashMap, HashSet};

/// Values the script asked for, carried from one frame to the next
///
/// One session belongs to one frame executor; independent editors each get their own.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Last known value per control name
    values: HashMap<String, f64>,
    /// Names requested during the current frame
    active: HashSet<String>,
    /// Inputs for the next evaluation
    pending: Vec<ContextInput>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts request processing for a frame
    pub fn begin_requests(&mut self) {
        self.active.clear();
    }

    /// Last known value for `name`, or `default` when none is known
    pub fn value_or(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).copied().unwrap_or(default)
    }

    /// Records the value of a named control for this frame
    pub fn record(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
        self.active.insert(name.to_string());
    }

    /// Marks `name` as requested without storing a value
    pub fn mark_active(&mut self, name: &str) {
        self.active.insert(name.to_string());
    }

    /// Finishes request processing: values of names not requested this frame are forgotten
    pub fn end_requests(&mut self) {
        let active = &self.active;
        self.values.retain(|name, _| active.contains(name));
    }

    /// Queues an input for the next evaluation
    pub fn push_input(&mut self, name: impl Into<String>, value: UniformValue) {
        self.pending.push(NamedValue::new(name, value));
    }

    /// Takes the queued inputs, leaving the queue empty
    pub fn take_inputs(&mut self) -> Vec<ContextInput> {
        std::mem::take(&mut self.pending)
    }
}
