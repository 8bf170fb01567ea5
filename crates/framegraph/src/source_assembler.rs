//! Shader source assembly with line provenance
//!
//! Generated fragment shaders are stitched together from spans of the user's script
//! and from boilerplate the engine writes itself. [`SourceAssembler`] keeps track of
//! which generated line came from where, so that a GPU compiler diagnostic can be
//! reported against the line the user actually wrote.

/// One contiguous block of generated text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceBlock {
    /// Original line the block starts at; `None` for synthetic blocks
    original_start_line: Option<u32>,
    /// Number of newline characters in the block
    line_count: u32,
}

/// Builds shader source text from sourced and synthetic fragments
#[derive(Debug, Clone, Default)]
pub struct SourceAssembler {
    text: String,
    blocks: Vec<SourceBlock>,
}

impl SourceAssembler {
    /// Creates an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a span of original source starting at `original_start_line`
    pub fn add_source_block(&mut self, text: &str, original_start_line: u32) {
        self.push_block(text, Some(original_start_line));
    }

    /// Appends engine-generated text that has no original source line
    pub fn add_synthetic_block(&mut self, text: &str) {
        self.push_block(text, None);
    }

    fn push_block(&mut self, text: &str, original_start_line: Option<u32>) {
        self.text.push_str(text);
        self.blocks.push(SourceBlock {
            original_start_line,
            line_count: line_count(text),
        });
    }

    /// Maps a 1-based line of the generated text back to its original source line
    ///
    /// # Arguments
    /// * `line` - 1-based line number, as reported by the shader compiler
    ///
    /// # Returns
    /// The original line, or `None` when the line belongs to a synthetic block or
    /// lies outside the generated text
    pub fn map_generated_line_to_source(&self, line: u32) -> Option<u32> {
        let mut block_start = 1u32;
        for block in &self.blocks {
            let block_end = block_start + block.line_count;
            if (block_start..block_end).contains(&line) {
                return block.original_start_line.map(|start| start + (line - block_start));
            }
            block_start = block_end;
        }
        None
    }

    /// The assembled text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the assembler, returning the assembled text
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Counts the newline characters in `text`
pub fn line_count(text: &str) -> u32 {
    text.bytes().filter(|&b| b == b'\n').count() as u32
}
