use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use claude_conversation::testing::FakeResponse;
use claude_conversation::{
    ContentBlock, ConversationConfig, Message, MessageResponse, Parameter, PayloadBuilder,
    StreamReducer, ToolExecutor, ToolRegistry, ToolResultBlock, ToolUseBlock, tool,
};
use serde_json::json;

// Alternating user/assistant history with `text_size`-character turns
fn create_config(count: usize, text_size: usize) -> ConversationConfig {
    let text = "a".repeat(text_size);
    let mut config = ConversationConfig::new("claude-sonnet-4-5");
    config.system = Some("You are a helpful assistant".into());
    config.messages = (0..count)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(&text)
            } else {
                Message::assistant(&text)
            }
        })
        .collect();
    config
}

// History made of complete tool interactions, plus the tool definitions
fn create_config_with_tools(steps: usize) -> ConversationConfig {
    let mut config = create_config(1, 64);
    config.tools = (0..8)
        .map(|i| {
            tool(format!("tool_{i}"), "Benchmark tool")
                .parameter(Parameter::new("query", "string").required())
                .parameter(Parameter::new("limit", "integer").default_value(10))
                .declare()
                .definition()
        })
        .collect();

    for i in 0..steps {
        let id = format!("toolu_{i}");
        config.messages.push(Message::assistant_blocks(vec![ContentBlock::ToolUse(
            ToolUseBlock::new(&id, "tool_0", json!({"query": "weather", "limit": 3})),
        )]));
        config.messages.push(Message::user_blocks(vec![ContentBlock::ToolResult(
            ToolResultBlock::success(&id, r#"{"temperature":21}"#),
        )]));
    }
    config
}

// Benchmark: PayloadBuilder::build with varying history lengths
fn bench_build_by_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_build_by_count");

    for count in [10, 50, 100, 500].iter() {
        let builder = PayloadBuilder::from_config(create_config(*count, 100));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(builder.build()));
        });
    }

    group.finish();
}

// Benchmark: PayloadBuilder::build with tool definitions and tool history
fn bench_build_with_tools(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_build_with_tools");

    for steps in [5, 25, 100].iter() {
        let builder = PayloadBuilder::from_config(create_config_with_tools(*steps));
        group.bench_with_input(BenchmarkId::from_parameter(steps), steps, |b, _| {
            b.iter(|| black_box(serde_json::to_string(&builder.build())));
        });
    }

    group.finish();
}

// Benchmark: reducing a streamed response back into text and chunks
fn bench_stream_reducer(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_reducer");

    for size in [100, 1000, 10000].iter() {
        let events = FakeResponse::make("x".repeat(*size)).to_events(20);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut reducer = StreamReducer::new();
                for event in events.iter().cloned() {
                    black_box(reducer.process_event(event).ok());
                }
                black_box(reducer.finish())
            });
        });
    }

    group.finish();
}

// Benchmark: the message pair appended after each tool step
fn bench_tool_interaction_messages(c: &mut Criterion) {
    let executor = ToolExecutor::new(ToolRegistry::new());
    let response: MessageResponse = FakeResponse::with_tool_use("search", json!({"query": "x"}))
        .to_message();
    let results = vec![ToolResultBlock::success("toolu_1", "found")];

    c.bench_function("tool_interaction_messages", |b| {
        b.iter(|| {
            black_box(executor.build_tool_interaction_messages(&response, results.clone()))
        });
    });
}

criterion_group!(
    benches,
    bench_build_by_count,
    bench_build_with_tools,
    bench_stream_reducer,
    bench_tool_interaction_messages
);
criterion_main!(benches);
