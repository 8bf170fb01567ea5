//! Recorded compiler sessions
//!
//! A session file captures what a script compiler produced for one script: the load
//! result and a sequence of per-frame results. Replaying serves them back in order,
//! wrapping around when the recording runs out.

use framegraph::script::{ContextInput, FrameResult, LoadResult, ScriptCompiler, ScriptError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk session format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    /// Script source the session was recorded from, if kept
    #[serde(default)]
    pub source: Option<String>,
    pub load: LoadResult,
    #[serde(default)]
    pub frames: Vec<FrameResult>,
}

impl Session {
    /// Reads a session from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// [`ScriptCompiler`] that replays a recorded session
#[derive(Debug)]
pub struct ReplayCompiler {
    session: Session,
    next_frame: usize,
    last_inputs: Vec<ContextInput>,
}

impl ReplayCompiler {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            next_frame: 0,
            last_inputs: Vec::new(),
        }
    }

    /// Source to pass to the first build
    pub fn source(&self) -> &str {
        self.session.source.as_deref().unwrap_or_default()
    }

    /// Inputs received by the most recent evaluation
    pub fn last_inputs(&self) -> &[ContextInput] {
        &self.last_inputs
    }
}

impl ScriptCompiler for ReplayCompiler {
    fn compile(&mut self, _source: &str) -> Result<LoadResult, ScriptError> {
        self.next_frame = 0;
        Ok(self.session.load.clone())
    }

    fn evaluate(&mut self, inputs: &[ContextInput]) -> Result<FrameResult, ScriptError> {
        self.last_inputs = inputs.to_vec();
        if self.session.frames.is_empty() {
            return Err(ScriptError::Evaluation("session has no recorded frames".to_string()));
        }
        let frame = self.session.frames[self.next_frame % self.session.frames.len()].clone();
        self.next_frame += 1;
        Ok(frame)
    }
}
