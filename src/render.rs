//! Output rendering for streamed chat turns.
//!
//! This module provides the [`Renderer`] trait the turn loop reports to, and a plain-text
//! implementation with optional ANSI styling.

use std::io::{self, Write};

use crate::ToolCall;

/// ANSI escape code for dim text (used for reasoning).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for reasoning).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for tool names).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for tool arguments).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for tool result success).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors, refusals and missing tools).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for magenta text (used for tool result bodies).
const ANSI_MAGENTA: &str = "\x1b[35m";

/// Trait for rendering a streamed turn.
///
/// Text and reasoning arrive incrementally.  The `finish_*` methods are called once per
/// section, when the stream moves past it.
pub trait Renderer: Send {
    /// Print a chunk of answer text.
    fn print_text(&mut self, text: &str);

    /// Print a chunk of reasoning text.
    ///
    /// Reasoning is displayed differently (dim/italic) to distinguish it from the answer.
    fn print_reasoning(&mut self, text: &str);

    /// Print an error message on stderr, exactly as given.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// The answer text is complete.
    fn finish_content(&mut self, content: &str) {
        _ = content;
    }

    /// The model refused; `refusal` is the complete refusal text.
    fn finish_refusal(&mut self, refusal: &str);

    /// The tool call at `index` has been fully streamed.
    fn finish_tool_call(&mut self, index: usize, call: &ToolCall);

    /// A tool has run and its result is about to be printed.
    fn start_tool_result(&mut self, call: &ToolCall, is_error: bool);

    /// Print tool result text.
    fn print_tool_result_text(&mut self, text: &str);

    /// Called when a tool result is complete.
    fn finish_tool_result(&mut self);

    /// The model asked for a tool nobody registered.
    fn print_missing_tool(&mut self, call: &ToolCall);

    /// Called when a turn is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
///
/// Output goes to stdout unless another writer is supplied; errors always go to stderr.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
    in_reasoning: bool,
    in_tool_result: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), use_color)
    }

    /// Creates a renderer that writes to `out` instead of stdout.
    pub fn with_writer(out: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            in_reasoning: false,
            in_tool_result: false,
            line_start: true,
        }
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        self.line_start = text.ends_with('\n');
        let _ = self.out.flush();
    }

    fn start_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn reset_reasoning(&mut self) {
        if self.in_reasoning {
            if self.use_color {
                self.write(ANSI_RESET);
            }
            self.start_line();
            self.in_reasoning = false;
        }
    }

    fn reset_tool_result(&mut self) {
        if self.in_tool_result {
            if self.use_color {
                self.write(ANSI_RESET);
            }
            self.in_tool_result = false;
        }
    }

    fn reset_styles(&mut self) {
        self.reset_reasoning();
        self.reset_tool_result();
    }

    fn styled(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        self.reset_styles();
        self.write(text);
    }

    fn print_reasoning(&mut self, text: &str) {
        if !self.in_reasoning {
            if self.use_color {
                self.write(ANSI_DIM);
                self.write(ANSI_ITALIC);
            } else {
                self.start_line();
                self.write("[reasoning] ");
            }
            self.in_reasoning = true;
        }
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        self.reset_styles();
        self.start_line();
        eprintln!("{}", self.styled(ANSI_RED, error));
    }

    fn print_info(&mut self, info: &str) {
        self.reset_styles();
        self.start_line();
        self.write(&format!("{info}\n"));
    }

    fn finish_content(&mut self, _: &str) {
        self.reset_styles();
        self.start_line();
    }

    fn finish_refusal(&mut self, refusal: &str) {
        self.reset_styles();
        self.start_line();
        let line = self.styled(ANSI_RED, &format!("[refusal] {refusal}"));
        self.write(&format!("{line}\n"));
    }

    fn finish_tool_call(&mut self, _: usize, call: &ToolCall) {
        self.reset_styles();
        self.start_line();
        let name = self.styled(ANSI_CYAN, &format!("[tool: {}]", call.name));
        let arguments = self.styled(ANSI_YELLOW, &call.arguments);
        self.write(&format!("{name} {arguments}\n"));
    }

    fn start_tool_result(&mut self, call: &ToolCall, is_error: bool) {
        self.reset_styles();
        self.start_line();
        let status = if is_error { "error" } else { "ok" };
        let label_color = if is_error { ANSI_RED } else { ANSI_GREEN };
        let label = self.styled(
            label_color,
            &format!("[tool result: {} {} ({status})]", call.name, call.id),
        );
        self.write(&format!("{label}\n"));
        if self.use_color {
            self.write(ANSI_MAGENTA);
        }
        self.in_tool_result = true;
    }

    fn print_tool_result_text(&mut self, text: &str) {
        self.write(text);
    }

    fn finish_tool_result(&mut self) {
        self.reset_tool_result();
        self.start_line();
    }

    fn print_missing_tool(&mut self, call: &ToolCall) {
        self.reset_styles();
        self.start_line();
        let line = self.styled(
            ANSI_RED,
            &format!("[missing tool: {}] {}", call.name, call.arguments),
        );
        self.write(&format!("{line}\n"));
    }

    fn finish_response(&mut self) {
        self.reset_styles();
        self.start_line();
    }

    fn print_interrupted(&mut self) {
        self.reset_styles();
        self.start_line();
        self.write("[interrupted]\n");
    }
}
