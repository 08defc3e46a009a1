use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchboard::core::{CallbackQuery, Chat, DeliveryResult, Message, User};
use switchboard::framework::{ResolveResult, resolver_fn};
use switchboard::prelude::*;
use switchboard::runtime::{DispatchConfig, SessionConfig};

const TOKEN: &str = "123:abc";

/// Keeps what the runtime sends instead of touching the network.
#[derive(Default)]
struct Recorder(Mutex<Vec<OutboundRequest>>);

impl Recorder {
    fn push(&self, request: OutboundRequest) {
        self.0.lock().unwrap().push(request);
    }

    fn texts(&self) -> Vec<String> {
        let mut texts: Vec<String> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.payload()["text"].as_str().map(str::to_string))
            .collect();
        texts.sort();
        texts
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

struct RecordingDelivery(Arc<Recorder>);

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, _token: &BotToken, request: OutboundRequest) -> DeliveryResult<ApiResponse> {
        self.0.push(request);
        Ok(ApiResponse::success(serde_json::json!(true)))
    }
}

fn runtime_with(config: SwitchboardConfig) -> (SwitchboardRuntime, Arc<Recorder>) {
    let runtime = SwitchboardRuntime::from_config(&config);
    let recorder = Arc::new(Recorder::default());
    runtime
        .set_delivery(RecordingDelivery(Arc::clone(&recorder)))
        .unwrap();
    (runtime, recorder)
}

fn message(update_id: i64, chat: i64, text: &str) -> Update {
    let mut update = Update::new(update_id);
    update.message = Some(Message::text(update_id, Chat::private(chat), text).from_user(User::new(chat, "alice")));
    update
}

fn callback(update_id: i64, data: &str) -> Update {
    let mut update = Update::new(update_id);
    update.callback_query = Some(CallbackQuery {
        id: format!("cb-{update_id}"),
        from: User::new(42, "alice"),
        message: Some(Message::text(1, Chat::private(42), "menu")),
        data: Some(data.to_string()),
    });
    update
}

async fn pick(vars: PathVars) -> String {
    format!("picked {}", vars.get("var").unwrap_or("?"))
}

#[tokio::test]
async fn test_callback_pattern_variables() {
    let (runtime, sent) = runtime_with(SwitchboardConfig::default());
    runtime
        .register(
            "pick",
            pick,
            [Mapping::new(TOKEN)
                .pattern("test {var:[0-9]}")
                .kind(EventKind::CallbackQuery)],
        )
        .unwrap();
    runtime.start().await.unwrap();

    runtime.submit(TOKEN, "my_bot", callback(1, "test 7")).await.unwrap();
    // Two digits do not match a one-digit capture.
    runtime.submit(TOKEN, "my_bot", callback(2, "test 77")).await.unwrap();
    // Same text, wrong kind.
    runtime.submit(TOKEN, "my_bot", message(3, 42, "test 7")).await.unwrap();
    // Unknown token.
    runtime.submit("other", "my_bot", callback(4, "test 7")).await.unwrap();

    runtime.stop().await.unwrap();

    assert_eq!(sent.texts(), ["picked 7"]);
    let stats = runtime.stats();
    assert_eq!(stats.dispatch.received, 4);
    assert_eq!(stats.dispatch.unrouted, 3);
    assert_eq!(stats.dispatch.delivered, 1);
}

async fn fallback() -> &'static str {
    "fallback"
}

async fn any_echo(text: Text) -> String {
    format!("echo {}", text.0.trim_start_matches("echo "))
}

async fn exact() -> &'static str {
    "exact"
}

async fn anything(event: Event) -> String {
    format!("any {}", event.kind().as_str())
}

#[tokio::test]
async fn test_most_specific_route_wins() {
    let (runtime, sent) = runtime_with(SwitchboardConfig::default());
    // Registered least specific first so registration order cannot explain the result.
    runtime
        .register("anything", anything, [Mapping::new(TOKEN).any_kind()])
        .unwrap();
    runtime
        .register("fallback", fallback, [Mapping::new(TOKEN).pattern("**")])
        .unwrap();
    runtime
        .register("echo", any_echo, [Mapping::new(TOKEN).pattern("echo *")])
        .unwrap();
    runtime
        .register("exact", exact, [Mapping::new(TOKEN).pattern("echo hello")])
        .unwrap();
    runtime.start().await.unwrap();

    runtime.submit(TOKEN, "my_bot", message(1, 1, "echo hello")).await.unwrap();
    runtime.submit(TOKEN, "my_bot", message(2, 2, "echo world")).await.unwrap();
    runtime.submit(TOKEN, "my_bot", message(3, 3, "something else")).await.unwrap();
    runtime.stop().await.unwrap();

    // A message-kind match-all beats the any-kind match-all.
    assert_eq!(sent.texts(), ["echo world", "exact", "fallback"]);
}

#[derive(Debug, Clone)]
struct Tenant(String);

impl Param for Tenant {}

async fn numbered(text: Text, tenant: Tenant) -> Result<String, std::io::Error> {
    let n: u32 = text.0.trim_start_matches("job ").parse().unwrap_or(1);
    if n % 2 == 0 {
        Ok(format!("{} done {n}", tenant.0))
    } else {
        Err(std::io::Error::other(format!("job {n} failed")))
    }
}

#[tokio::test]
async fn test_failures_stay_isolated() {
    let config = SwitchboardConfig {
        dispatch: DispatchConfig {
            max_concurrency: 8,
            ..Default::default()
        },
        ..Default::default()
    };
    let (runtime, sent) = runtime_with(config);
    runtime
        .argument_resolver(resolver_fn(|ctx: &DispatchContext| -> ResolveResult<Tenant> {
            Ok(Tenant(format!("bot {}", ctx.event().bot())))
        }))
        .unwrap();
    runtime
        .register("jobs", numbered, [Mapping::new(TOKEN).pattern("job *")])
        .unwrap();

    let reports = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&reports);
    runtime
        .set_result_observer(move |report: DeliveryReport| {
            assert!(report.is_success());
            observed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    runtime.start().await.unwrap();

    for n in 0..100 {
        runtime
            .submit(TOKEN, "my_bot", message(n, n % 10, &format!("job {n}")))
            .await
            .unwrap();
    }
    runtime.stop().await.unwrap();

    let stats = runtime.stats();
    assert_eq!(stats.dispatch.received, 100);
    assert_eq!(stats.dispatch.invoked, 100);
    assert_eq!(stats.dispatch.failed, 50);
    assert_eq!(sent.len(), 50);
    assert_eq!(reports.load(Ordering::SeqCst), 50);
    assert!(sent.texts().iter().all(|t| t.starts_with("bot my_bot done")));
}

#[derive(Debug, Default)]
struct Visits(AtomicU32);

async fn visit(visits: SessionState<Visits>) -> String {
    let n = visits.0.0.fetch_add(1, Ordering::SeqCst) + 1;
    format!("visit {n}")
}

#[tokio::test(start_paused = true)]
async fn test_idle_sessions_are_evicted() {
    let config = SwitchboardConfig {
        session: SessionConfig {
            idle_timeout_secs: 5,
            sweep_interval_secs: 1,
        },
        ..Default::default()
    };
    let (runtime, sent) = runtime_with(config);
    let torn_down = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&torn_down);
    runtime
        .set_session_teardown(move |_key, _name, _value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    runtime
        .register("visit", visit, [Mapping::new(TOKEN).pattern("visit")])
        .unwrap();
    runtime.start().await.unwrap();

    runtime.submit(TOKEN, "my_bot", message(1, 9, "visit")).await.unwrap();
    runtime.submit(TOKEN, "my_bot", message(2, 9, "visit")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runtime.stats().sessions, 1);

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(runtime.stats().sessions, 0);
    assert_eq!(torn_down.load(Ordering::SeqCst), 1);

    // A fresh session starts counting again.
    runtime.submit(TOKEN, "my_bot", message(3, 9, "visit")).await.unwrap();
    runtime.stop().await.unwrap();

    assert_eq!(sent.texts(), ["visit 1", "visit 1", "visit 2"]);
    assert_eq!(torn_down.load(Ordering::SeqCst), 2);
}
