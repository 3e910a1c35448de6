use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("aicoder.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("aicoder.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("aicoder.client.request_duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("aicoder.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("aicoder.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("aicoder.stream.bytes");
pub(crate) static STREAM_INTERRUPTS: Counter = Counter::new("aicoder.stream.interrupts");
pub(crate) static STREAM_DURATION: Moments = Moments::new("aicoder.stream.duration_seconds");

pub(crate) static TURN_ROUNDS: Counter = Counter::new("aicoder.turn.rounds");
pub(crate) static TURN_DURATION: Moments = Moments::new("aicoder.turn.duration_seconds");
pub(crate) static TOOL_CALLS: Counter = Counter::new("aicoder.tool.calls");
pub(crate) static TOOL_ERRORS: Counter = Counter::new("aicoder.tool.errors");
pub(crate) static TOOL_MISSING: Counter = Counter::new("aicoder.tool.missing");
pub(crate) static TOOL_DURATION: Moments = Moments::new("aicoder.tool.duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_INTERRUPTS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&TURN_ROUNDS);
    collector.register_moments(&TURN_DURATION);
    collector.register_counter(&TOOL_CALLS);
    collector.register_counter(&TOOL_ERRORS);
    collector.register_counter(&TOOL_MISSING);
    collector.register_moments(&TOOL_DURATION);
}
