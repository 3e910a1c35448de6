use std::io::Write;
use std::time::Instant;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use utf8path::Path;

use crate::json_schema::JsonSchema;
use crate::observability::{TOOL_CALLS, TOOL_DURATION, TOOL_ERRORS, TOOL_MISSING};
use crate::{Message, ToolCall, ToolDefinition};

////////////////////////////////////////////// Tool //////////////////////////////////////////////

/// Trait for functions the model may call.
///
/// Tools never fail the turn.  Whatever goes wrong in [`Tool::execute`] is reported back to
/// the model as the content of the tool message.
pub trait Tool: Send + Sync {
    /// Returns the name the model calls the tool by.
    fn name(&self) -> String;
    /// Returns the description advertised to the model.
    fn description(&self) -> String;
    /// Returns the JSON schema of the arguments.
    fn parameters(&self) -> serde_json::Value;
    /// Run the tool on the raw JSON arguments.
    fn execute(&self, arguments: &str) -> Result<String, std::io::Error>;

    /// Converts the tool to the definition sent with each request.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }

    /// Answer `call` with a tool message linked to its id.
    fn call(&self, call: &ToolCall) -> ToolResponse {
        match self.execute(&call.arguments) {
            Ok(content) => ToolResponse {
                message: Message::tool(content, call.id.clone()),
                is_error: false,
            },
            Err(err) => ToolResponse {
                message: Message::tool(
                    format!("Error calling tool {}(): {err}", self.name()),
                    call.id.clone(),
                ),
                is_error: true,
            },
        }
    }
}

/// The tool message produced for a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub message: Message,
    /// True when the content describes a failure.
    pub is_error: bool,
}

impl ToolResponse {
    /// The text sent back to the model.
    pub fn content(&self) -> &str {
        self.message.content().unwrap_or_default()
    }
}

fn parse_arguments<T: DeserializeOwned>(arguments: &str) -> Result<T, std::io::Error> {
    serde_json::from_str(arguments).map_err(|err| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid arguments: {err}"),
        )
    })
}

fn non_empty<'a>(value: &'a str, argument: &str) -> Result<&'a str, std::io::Error> {
    if value.is_empty() {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("argument {argument} is empty"),
        ))
    } else {
        Ok(value)
    }
}

/////////////////////////////////////////// ToolRegistry ///////////////////////////////////////////

/// The tools available to the model, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `read_file`, `override_file` and `replace_in_file`.
    pub fn with_file_tools() -> Self {
        let mut registry = Self::new();
        registry.register(ReadFile);
        registry.register(OverrideFile);
        registry.register(ReplaceInFile);
        registry
    }

    /// Add a tool.  A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name();
        let tool: Box<dyn Tool> = Box::new(tool);
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == name) {
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| tool.as_ref())
    }

    /// Names of the registered tools in order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// Definitions of the registered tools in order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the tool `call` names.  Returns `None` when no such tool is registered.
    pub fn dispatch(&self, call: &ToolCall) -> Option<ToolResponse> {
        let Some(tool) = self.get(&call.name) else {
            TOOL_MISSING.click();
            return None;
        };
        TOOL_CALLS.click();
        let start = Instant::now();
        let response = tool.call(call);
        TOOL_DURATION.add(start.elapsed().as_secs_f64());
        if response.is_error {
            TOOL_ERRORS.click();
        }
        Some(response)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

///////////////////////////////////////////// ReadFile /////////////////////////////////////////////

/// Arguments of `read_file`.
#[derive(Debug, Deserialize, aicoder_derive::JsonSchema)]
pub struct ReadFileArguments {
    pub file_path: String,
}

/// Returns the full content of a local file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadFile;

impl Tool for ReadFile {
    fn name(&self) -> String {
        "read_file".to_string()
    }

    fn description(&self) -> String {
        "Use this function to read and analyze a local file before modifying it.".to_string()
    }

    fn parameters(&self) -> serde_json::Value {
        ReadFileArguments::json_schema()
    }

    fn execute(&self, arguments: &str) -> Result<String, std::io::Error> {
        let args: ReadFileArguments = parse_arguments(arguments)?;
        let path = Path::from(non_empty(&args.file_path, "file_path")?);
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/////////////////////////////////////////// OverrideFile ///////////////////////////////////////////

/// Arguments of `override_file`.
#[derive(Debug, Deserialize, aicoder_derive::JsonSchema)]
pub struct OverrideFileArguments {
    pub file_path: String,
    pub content: String,
}

/// Replaces a local file with new content, creating it if needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverrideFile;

impl Tool for OverrideFile {
    fn name(&self) -> String {
        "override_file".to_string()
    }

    fn description(&self) -> String {
        "Use this function to override a local file after identifying required changes."
            .to_string()
    }

    fn parameters(&self) -> serde_json::Value {
        OverrideFileArguments::json_schema()
    }

    fn execute(&self, arguments: &str) -> Result<String, std::io::Error> {
        let args: OverrideFileArguments = parse_arguments(arguments)?;
        let path = Path::from(non_empty(&args.file_path, "file_path")?);
        write_file(&path, &args.content)?;
        Ok("File successfully overridden".to_string())
    }
}

/// Truncate and write `path`; new files get mode 0644.
fn write_file(path: &Path, content: &str) -> Result<(), std::io::Error> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())?;
    file.flush()
}

/////////////////////////////////////////// ReplaceInFile //////////////////////////////////////////

/// Arguments of `replace_in_file`.
#[derive(Debug, Deserialize, aicoder_derive::JsonSchema)]
pub struct ReplaceInFileArguments {
    pub file_path: String,
    /// Text to search for.
    pub old_lines: String,
    /// Text to put in its place.
    pub new_lines: String,
}

/// Replaces text in a local file.
///
/// Every occurrence of `old_lines` is replaced, even though the description tells the model
/// to pick a pattern that occurs exactly once.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceInFile;

impl Tool for ReplaceInFile {
    fn name(&self) -> String {
        "replace_in_file".to_string()
    }

    fn description(&self) -> String {
        "Use this function to replace matching lines with other lines in a file. \
         Make sure the search pattern only occurs exactly once."
            .to_string()
    }

    fn parameters(&self) -> serde_json::Value {
        ReplaceInFileArguments::json_schema()
    }

    fn execute(&self, arguments: &str) -> Result<String, std::io::Error> {
        let args: ReplaceInFileArguments = parse_arguments(arguments)?;
        let path = Path::from(non_empty(&args.file_path, "file_path")?);
        let old_lines = non_empty(&args.old_lines, "old_lines")?;
        let content = std::fs::read_to_string(&path)?;
        let content = content.replace(old_lines, &args.new_lines);
        write_file(&path, &content)?;
        Ok("Text successfully replaced in file".to_string())
    }
}
