use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use aicoder::chat::{ChatArgs, ChatConfig, ChatSession, transcript};
use aicoder::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletions, ChunkStream, CompletionSettings,
    Conversation, Error, Interrupt, Message, Renderer, Result, ToolCall, ToolRegistry,
    TurnOutcome, TurnRunner,
};

//////////////////////////////////////////// Scripted client ////////////////////////////////////////////

enum Script {
    /// Yield these items, then end.
    Chunks(Vec<Result<ChatCompletionChunk>>),
    /// Yield these chunks, then never produce another item.
    Hang(Vec<ChatCompletionChunk>),
    /// Never answer the request.
    Stall,
}

#[derive(Default)]
struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedClient {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(vec![]),
        }
    }

    fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletions for ScriptedClient {
    async fn stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Chunks(items)) => Ok(Box::pin(stream::iter(items))),
            Some(Script::Hang(chunks)) => Ok(Box::pin(
                stream::iter(chunks.into_iter().map(Ok)).chain(stream::pending()),
            )),
            Some(Script::Stall) => std::future::pending().await,
            None => Err(Error::connection("no scripted response left", None)),
        }
    }
}

fn chunk(value: serde_json::Value) -> ChatCompletionChunk {
    serde_json::from_value(value).unwrap()
}

fn content(text: &str) -> ChatCompletionChunk {
    chunk(json!({"id": "c", "choices": [{"index": 0, "delta": {"content": text}}]}))
}

fn finish(reason: &str) -> ChatCompletionChunk {
    chunk(json!({"id": "c", "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]}))
}

fn refusal(text: &str) -> ChatCompletionChunk {
    chunk(json!({"id": "c", "choices": [{"index": 0, "delta": {"refusal": text}}]}))
}

fn reasoning(text: &str) -> ChatCompletionChunk {
    chunk(json!({"id": "c", "choices": [{"index": 0, "delta": {"reasoning": text}}]}))
}

fn cancel_soon(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
    });
}

fn tool_call(index: usize, id: &str, name: &str, arguments: &str) -> ChatCompletionChunk {
    chunk(json!({"id": "c", "choices": [{"index": 0, "delta": {"tool_calls": [{
        "index": index,
        "id": id,
        "type": "function",
        "function": {"name": name, "arguments": arguments},
    }]}}]}))
}

fn tool_arguments(index: usize, arguments: &str) -> ChatCompletionChunk {
    chunk(json!({"id": "c", "choices": [{"index": 0, "delta": {"tool_calls": [{
        "index": index,
        "function": {"arguments": arguments},
    }]}}]}))
}

/////////////////////////////////////////// Recording renderer ///////////////////////////////////////////

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    cancel_on_text: Option<CancellationToken>,
}

impl Recorder {
    fn has(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

impl Renderer for Recorder {
    fn print_text(&mut self, text: &str) {
        self.events.push(format!("text:{text}"));
        if let Some(token) = self.cancel_on_text.as_ref() {
            token.cancel();
        }
    }

    fn print_reasoning(&mut self, text: &str) {
        self.events.push(format!("reasoning:{text}"));
    }

    fn print_error(&mut self, error: &str) {
        self.events.push(format!("error:{error}"));
    }

    fn print_info(&mut self, info: &str) {
        self.events.push(format!("info:{info}"));
    }

    fn finish_content(&mut self, content: &str) {
        self.events.push(format!("content:{content}"));
    }

    fn finish_refusal(&mut self, refusal: &str) {
        self.events.push(format!("refusal:{refusal}"));
    }

    fn finish_tool_call(&mut self, index: usize, call: &ToolCall) {
        self.events.push(format!("tool_call:{index}:{}", call.name));
    }

    fn start_tool_result(&mut self, call: &ToolCall, is_error: bool) {
        self.events
            .push(format!("tool_result:{}:{is_error}", call.name));
    }

    fn print_tool_result_text(&mut self, text: &str) {
        self.events.push(format!("result_text:{text}"));
    }

    fn finish_tool_result(&mut self) {
        self.events.push("end_result".to_string());
    }

    fn print_missing_tool(&mut self, call: &ToolCall) {
        self.events.push(format!("missing:{}", call.name));
    }

    fn finish_response(&mut self) {
        self.events.push("done".to_string());
    }

    fn print_interrupted(&mut self) {
        self.events.push("interrupted".to_string());
    }
}

async fn run_turn(
    client: &ScriptedClient,
    tools: &ToolRegistry,
    conversation: &mut Conversation,
    renderer: &mut Recorder,
    cancel: &CancellationToken,
) -> Result<TurnOutcome> {
    let settings = CompletionSettings::new("qwen3:1.7b", None);
    TurnRunner::new(client, &settings, tools)
        .run(conversation, renderer, cancel)
        .await
}

////////////////////////////////////////////////// Tests //////////////////////////////////////////////////

#[tokio::test]
async fn answer_without_tools_is_one_round() {
    let client = ScriptedClient::new(vec![Script::Chunks(vec![
        Ok(content("Hel")),
        Ok(content("lo")),
        Ok(finish("stop")),
    ])]);
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("hi")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome {
            requests: 1,
            tool_calls: 0,
            interrupted: false,
        }
    );
    assert_eq!(
        conversation.messages(),
        &[Message::user("hi"), Message::assistant("Hello")]
    );
    assert_eq!(
        renderer.events,
        vec!["text:Hel", "text:lo", "content:Hello", "done"]
    );

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "qwen3:1.7b");
    assert!(requests[0].stream);
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[0].messages, vec![Message::user("hi")]);
}

#[tokio::test]
async fn tool_calls_loop_until_the_model_answers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.rs");
    std::fs::write(&path, "fn main() {}\n").unwrap();
    let arguments = json!({"file_path": path.to_str().unwrap()}).to_string();
    let (head, tail) = arguments.split_at(arguments.len() / 2);

    let client = ScriptedClient::new(vec![
        Script::Chunks(vec![
            Ok(tool_call(0, "call_1", "read_file", head)),
            Ok(tool_arguments(0, tail)),
            Ok(finish("tool_calls")),
        ]),
        Script::Chunks(vec![Ok(content("An empty main.")), Ok(finish("stop"))]),
    ]);
    let tools = ToolRegistry::with_file_tools();
    let mut conversation = Conversation::from(vec![Message::user("what is in main.rs?")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.requests, 2);
    assert_eq!(outcome.tool_calls, 1);
    assert!(!outcome.interrupted);
    assert_eq!(
        conversation.messages(),
        &[
            Message::user("what is in main.rs?"),
            Message::assistant_with_tool_calls(
                None,
                vec![ToolCall::new("call_1", "read_file", arguments.clone())]
            ),
            Message::tool("fn main() {}\n", "call_1"),
            Message::assistant("An empty main."),
        ]
    );
    assert!(renderer.has("tool_call:0:read_file"));
    assert!(renderer.has("tool_result:read_file:false"));
    assert!(renderer.has("content:An empty main."));
    assert_eq!(renderer.events.last().map(String::as_str), Some("done"));

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 3);
    assert_eq!(requests[1].messages.len(), 3);
}

#[tokio::test]
async fn missing_tool_is_reported_and_not_answered() {
    let client = ScriptedClient::new(vec![
        Script::Chunks(vec![
            Ok(tool_call(0, "call_9", "run_shell", "{\"cmd\":\"ls\"}")),
            Ok(finish("tool_calls")),
        ]),
        Script::Chunks(vec![Ok(content("I cannot do that.")), Ok(finish("stop"))]),
    ]);
    let tools = ToolRegistry::with_file_tools();
    let mut conversation = Conversation::from(vec![Message::user("list files")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.requests, 2);
    assert_eq!(outcome.tool_calls, 0);
    assert!(renderer.has("missing:run_shell"));
    assert_eq!(conversation.len(), 3);
    assert!(conversation.iter().all(|message| message.role() != "tool"));
    assert_eq!(
        conversation.last(),
        Some(&Message::assistant("I cannot do that."))
    );
}

#[tokio::test]
async fn interrupt_keeps_partial_answer() {
    let client = ScriptedClient::new(vec![Script::Hang(vec![content("partial")])]);
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("tell me a long story")]);
    let cancel = CancellationToken::new();
    let mut renderer = Recorder {
        cancel_on_text: Some(cancel.clone()),
        ..Recorder::default()
    };

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome {
            requests: 1,
            tool_calls: 0,
            interrupted: true,
        }
    );
    assert_eq!(conversation.last(), Some(&Message::assistant("partial")));
    assert_eq!(
        renderer.events,
        vec!["text:partial", "interrupted", "content:partial", "done"]
    );
}

#[tokio::test]
async fn interrupted_round_runs_its_tools_then_stops() {
    let client = ScriptedClient::new(vec![Script::Hang(vec![
        tool_call(0, "call_1", "read_file", "{\"file_path\":\"/nonexistent/aicoder\"}"),
        content("reading"),
    ])]);
    let tools = ToolRegistry::with_file_tools();
    let mut conversation = Conversation::from(vec![Message::user("read it")]);
    let cancel = CancellationToken::new();
    let mut renderer = Recorder {
        cancel_on_text: Some(cancel.clone()),
        ..Recorder::default()
    };

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.requests, 1);
    assert_eq!(outcome.tool_calls, 1);
    assert!(outcome.interrupted);
    assert!(renderer.has("tool_result:read_file:true"));
    let last = conversation.last().unwrap();
    assert_eq!(last.role(), "tool");
    assert!(
        last.content()
            .unwrap()
            .starts_with("Error calling tool read_file(): ")
    );
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn stream_error_fails_the_turn() {
    let client = ScriptedClient::new(vec![Script::Chunks(vec![
        Ok(content("a")),
        Err(Error::streaming("connection reset", None)),
    ])]);
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("hi")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    let err = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_streaming());
    assert_eq!(conversation.messages(), &[Message::user("hi")]);
    assert!(!renderer.has("done"));
}

#[tokio::test]
async fn request_error_fails_the_turn() {
    let client = ScriptedClient::default();
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("hi")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    let result = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel).await;

    assert!(result.is_err());
    assert_eq!(conversation.len(), 1);
    assert!(renderer.events.is_empty());
}

#[tokio::test]
async fn interrupt_before_first_chunk() {
    let client = ScriptedClient::new(vec![Script::Hang(vec![])]);
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("hi")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();
    cancel_soon(&cancel);

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert!(outcome.interrupted);
    assert_eq!(outcome.requests, 1);
    assert_eq!(renderer.events, vec!["interrupted", "done"]);
    let last = conversation.last().unwrap();
    assert_eq!(last, &Message::assistant(""));
    assert_eq!(
        serde_json::to_value(last).unwrap(),
        json!({"role": "assistant", "content": ""})
    );
}

#[tokio::test]
async fn interrupt_while_waiting_for_response() {
    let client = ScriptedClient::new(vec![Script::Stall]);
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("hi")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();
    cancel_soon(&cancel);

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert!(outcome.interrupted);
    assert_eq!(client.requests().len(), 1);
    assert_eq!(renderer.events, vec!["interrupted", "done"]);
    assert_eq!(conversation.last(), Some(&Message::assistant("")));
}

#[tokio::test]
async fn refusal_only_answer() {
    let client = ScriptedClient::new(vec![Script::Chunks(vec![
        Ok(refusal("I can't help with that.")),
        Ok(finish("stop")),
    ])]);
    let tools = ToolRegistry::with_file_tools();
    let mut conversation = Conversation::from(vec![Message::user("delete everything")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    let outcome = run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.requests, 1);
    assert_eq!(outcome.tool_calls, 0);
    assert_eq!(
        renderer.events,
        vec!["refusal:I can't help with that.", "done"]
    );
    assert_eq!(
        conversation.last(),
        Some(&Message::Assistant {
            content: Some(String::new()),
            refusal: Some("I can't help with that.".to_string()),
            tool_calls: vec![],
        })
    );
}

#[tokio::test]
async fn reasoning_only_answer_is_sent_back_with_content() {
    let client = ScriptedClient::new(vec![
        Script::Chunks(vec![Ok(reasoning("thinking")), Ok(finish("stop"))]),
        Script::Chunks(vec![Ok(content("Done.")), Ok(finish("stop"))]),
    ]);
    let tools = ToolRegistry::new();
    let mut conversation = Conversation::from(vec![Message::user("hi")]);
    let mut renderer = Recorder::default();
    let cancel = CancellationToken::new();

    run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();
    assert_eq!(renderer.events, vec!["reasoning:thinking", "done"]);
    conversation.push(Message::user("and?"));
    run_turn(&client, &tools, &mut conversation, &mut renderer, &cancel)
        .await
        .unwrap();

    let requests = client.requests();
    let body = serde_json::to_value(&requests[1]).unwrap();
    assert_eq!(body["messages"][1], json!({"role": "assistant", "content": ""}));
}

#[tokio::test]
async fn session_saves_even_when_the_turn_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.yaml");
    let args = ChatArgs {
        session_file: Some(path.to_str().unwrap().to_string()),
        ..ChatArgs::default()
    };
    let config = ChatConfig::from_args(args, None, None).unwrap();
    let client = ScriptedClient::new(vec![
        Script::Chunks(vec![Ok(content("Hi")), Ok(finish("stop"))]),
        Script::Chunks(vec![Err(Error::streaming("connection reset", None))]),
    ]);
    let mut session = ChatSession::open(client, &config).unwrap();
    let interrupt = Interrupt::new();
    let mut renderer = Recorder::default();

    session.send("hello", &mut renderer, &interrupt).await.unwrap();
    // No turn is running, so nobody receives the interrupt.
    assert!(!interrupt.trigger());
    let err = session
        .send("again", &mut renderer, &interrupt)
        .await
        .unwrap_err();
    assert!(err.is_streaming());
    assert!(!interrupt.trigger());

    let record = transcript::load(&path).unwrap();
    assert_eq!(record.model, "qwen3:1.7b");
    assert_eq!(
        record.conversation.messages(),
        &[
            Message::user("hello"),
            Message::assistant("Hi"),
            Message::user("again"),
        ]
    );
}
