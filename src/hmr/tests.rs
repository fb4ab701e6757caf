use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use super::*;
use crate::refresh::SignalError;

/// In-memory socket recording every frame it is sent.
#[derive(Clone)]
struct MockSocket {
    frames: Arc<Mutex<Vec<String>>>,
    open: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl MockSocket {
    fn new() -> Self {
        Self {
            frames: Arc::default(),
            open: Arc::new(AtomicBool::new(true)),
            broken: Arc::default(),
        }
    }

    fn messages(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn reconnect(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Stay open but fail every write.
    fn break_pipe(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl Connection for MockSocket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        if !self.is_open() || self.broken.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.frames.lock().push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.disconnect();
    }
}

/// Component with plain map-backed signals.
#[derive(Default)]
struct Counter {
    signals: Mutex<FxHashMap<String, Value>>,
}

impl Counter {
    fn with_count(count: i64) -> Arc<Self> {
        let counter = Self::default();
        counter.signals.lock().insert("count".into(), json!(count));
        Arc::new(counter)
    }

    fn count(&self) -> Value {
        self.signals.lock()["count"].clone()
    }
}

impl ReactiveStateHolder for Counter {
    fn signal_keys(&self) -> Vec<String> {
        self.signals.lock().keys().cloned().collect()
    }

    fn read_signal(&self, key: &str) -> Result<Value, SignalError> {
        self.signals
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| SignalError::Missing(key.to_string()))
    }

    fn write_signal(&self, key: &str, value: Value) -> Result<(), SignalError> {
        self.signals.lock().insert(key.to_string(), value);
        Ok(())
    }
}

const NO_DEPS: [&str; 0] = [];

/// `app → component → utils`, files at `/src/<id>.ts`.
fn chain() -> HmrEngine {
    let engine = HmrEngine::default();
    engine
        .register_module("app", "/src/app.ts", ModuleKind::Module, ["component"])
        .unwrap();
    engine
        .register_module("component", "/src/component.ts", ModuleKind::Module, ["utils"])
        .unwrap();
    engine
        .register_module("utils", "/src/utils.ts", ModuleKind::Module, NO_DEPS)
        .unwrap();
    engine
}

async fn wait_for_flush() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

fn exports(value: Value) -> ModuleExports {
    value.as_object().cloned().unwrap()
}

mod registration {
    use super::*;

    #[test]
    fn unknown_dependencies_get_placeholders() {
        let engine = HmrEngine::default();
        engine
            .register_module("app", "/src/app.ts", ModuleKind::Module, ["missing"])
            .unwrap();

        let graph = engine.module_graph();
        let missing = graph.get_node("missing").unwrap();
        assert!(missing.is_virtual());
        assert_eq!(graph.get_dependents("missing"), vec!["app"]);
    }

    #[test]
    fn reregistration_replaces_imports() {
        let engine = chain();
        engine
            .register_module("component", "/src/component.ts", ModuleKind::Module, ["app"])
            .unwrap();

        let graph = engine.module_graph();
        assert_eq!(graph.get_dependencies("component"), vec!["app"]);
        assert!(graph.get_dependents("utils").is_empty());
    }

    #[test]
    fn placeholder_filled_by_later_registration() {
        let engine = HmrEngine::default();
        engine
            .register_module("app", "/src/app.ts", ModuleKind::Module, ["lib"])
            .unwrap();
        engine
            .register_module("lib", "/src/lib.ts", ModuleKind::Module, NO_DEPS)
            .unwrap();

        let graph = engine.module_graph();
        assert_eq!(graph.get_modules_by_file("/src/lib.ts"), vec!["lib"]);
        assert_eq!(graph.get_dependents("lib"), vec!["app"]);
    }

    #[test]
    fn accept_unknown_module_fails() {
        let engine = HmrEngine::default();
        let err = engine.accept_hmr("ghost", true).unwrap_err();
        assert!(matches!(err, HmrError::UnknownModule(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn configured_glob_matches_literal_brackets() {
        let options = HmrOptions {
            boundaries: vec!["routes/[id]/**".into()],
            ..HmrOptions::default()
        };
        let engine = HmrEngine::new(options).unwrap();
        engine
            .register_module("main", "/app/main.ts", ModuleKind::Module, ["page"])
            .unwrap();
        engine
            .register_module("page", "/app/routes/[id]/page.ts", ModuleKind::Module, ["db"])
            .unwrap();
        engine
            .register_module("db", "/app/db.ts", ModuleKind::Module, NO_DEPS)
            .unwrap();

        let updates = engine.handle_update("/app/db.ts").await;
        assert_eq!(updates[0].accepted_path.as_deref(), Some("page"));
    }
}

mod updates {
    use super::*;

    #[tokio::test]
    async fn update_stops_at_accepting_boundary() {
        let engine = chain();
        engine.accept_hmr("component", true).unwrap();

        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        let updates = engine.handle_update("/src/utils.ts").await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, UpdateKind::Update);
        assert_eq!(updates[0].accepted_path.as_deref(), Some("component"));

        wait_for_flush().await;

        let messages = socket.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], json!({"type": "connected"}));
        assert_eq!(messages[1]["type"], "update");
        assert_eq!(messages[1]["updates"].as_array().unwrap().len(), 1);
        assert_eq!(messages[1]["updates"][0]["type"], "update");
        assert_eq!(messages[1]["updates"][0]["path"], "/src/utils.ts");
        assert_eq!(messages[1]["updates"][0]["acceptedPath"], "component");
    }

    #[tokio::test]
    async fn no_boundary_means_full_reload() {
        let engine = chain();

        let updates = engine.handle_update("/src/utils.ts").await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_full_reload());
        assert_eq!(updates[0].accepted_path, None);
    }

    #[tokio::test]
    async fn importer_cycle_without_boundary_reloads() {
        let engine = HmrEngine::default();
        engine
            .register_module("view", "/src/view.ts", ModuleKind::Component, ["utils"])
            .unwrap();
        engine
            .register_module("c", "/src/c.ts", ModuleKind::Module, ["utils", "d"])
            .unwrap();
        engine
            .register_module("d", "/src/d.ts", ModuleKind::Module, ["c"])
            .unwrap();
        engine
            .register_module("utils", "/src/utils.ts", ModuleKind::Module, NO_DEPS)
            .unwrap();

        let updates = engine.handle_update("/src/utils.ts").await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_full_reload());
    }

    #[tokio::test]
    async fn branch_missing_a_boundary_reloads() {
        let engine = chain();
        engine.accept_hmr("component", true).unwrap();
        engine
            .register_module("cli", "/src/cli.ts", ModuleKind::Module, ["utils"])
            .unwrap();

        let updates = engine.handle_update("/src/utils.ts").await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_full_reload());
        assert_eq!(updates[0].path, "/src/utils.ts");
    }

    #[tokio::test]
    async fn unknown_file_means_full_reload() {
        let engine = chain();
        let updates = engine.handle_update("/src/nowhere.ts").await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_full_reload());
        assert_eq!(updates[0].path, "/src/nowhere.ts");
    }

    #[tokio::test]
    async fn component_extension_is_a_boundary() {
        let engine = HmrEngine::default();
        engine
            .register_module("main", "/src/main.ts", ModuleKind::Module, ["App"])
            .unwrap();
        engine
            .register_module("App", "/src/App.tsx", ModuleKind::Module, ["store"])
            .unwrap();
        engine
            .register_module("store", "/src/store.ts", ModuleKind::Module, NO_DEPS)
            .unwrap();

        let updates = engine.handle_update("/src/store.ts").await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].accepted_path.as_deref(), Some("App"));
    }

    #[tokio::test]
    async fn update_invalidates_importers() {
        let engine = chain();
        engine.accept_hmr("component", true).unwrap();

        let updates = engine.handle_update("/src/utils.ts").await;
        let graph = engine.module_graph();
        for id in ["utils", "component", "app"] {
            assert_eq!(graph.get_node(id).unwrap().last_hmr_timestamp(), updates[0].timestamp);
        }
    }

    #[tokio::test]
    async fn timestamps_increase() {
        let engine = chain();
        engine.accept_hmr("utils", true).unwrap();

        let first = engine.handle_update("/src/utils.ts").await;
        let second = engine.handle_update("/src/utils.ts").await;
        assert!(second[0].timestamp > first[0].timestamp);
    }

    #[tokio::test]
    async fn on_update_sees_every_update() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let options = HmrOptions::default().with_on_update(move |update| {
            assert_eq!(update.accepted_path.as_deref(), Some("component"));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let engine = HmrEngine::new(options).unwrap();
        engine
            .register_module("component", "/src/component.ts", ModuleKind::Module, NO_DEPS)
            .unwrap();
        engine.accept_hmr("component", true).unwrap();

        engine.handle_update("/src/component.ts").await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

mod errors {
    use super::*;

    fn failing_engine(reload_on_error: bool, errors: Arc<Mutex<Vec<String>>>) -> HmrEngine {
        let options = HmrOptions {
            reload_on_error,
            ..HmrOptions::default()
        }
        .with_on_update(|_| anyhow::bail!("handler exploded"))
        .with_on_error(move |e| errors.lock().push(e.to_string()));

        let engine = HmrEngine::new(options).unwrap();
        engine
            .register_module("page", "/src/page.ts", ModuleKind::Module, NO_DEPS)
            .unwrap();
        engine.accept_hmr("page", true).unwrap();
        engine
    }

    #[tokio::test]
    async fn callback_error_reloads_page() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let engine = failing_engine(true, Arc::clone(&errors));
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        let updates = engine.handle_update("/src/page.ts").await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_full_reload());
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("handler exploded"));

        wait_for_flush().await;
        let messages = socket.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["updates"][0]["type"], "full-reload");
    }

    #[tokio::test]
    async fn callback_error_without_reload() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let engine = failing_engine(false, Arc::clone(&errors));
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        let updates = engine.handle_update("/src/page.ts").await;
        assert!(updates.is_empty());
        assert_eq!(errors.lock().len(), 1);

        wait_for_flush().await;
        assert_eq!(socket.messages().len(), 1);
    }
}

mod batching {
    use super::*;

    #[tokio::test]
    async fn updates_within_window_share_one_message() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        engine.send_update(HmrUpdate::update("/a.ts", "a", 1));
        engine.send_update(HmrUpdate::update("/b.ts", "b", 2));
        assert_eq!(socket.messages().len(), 1);

        wait_for_flush().await;
        let messages = socket.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["updates"].as_array().unwrap().len(), 2);
        assert_eq!(messages[1]["updates"][1]["path"], "/b.ts");
    }

    #[tokio::test]
    async fn custom_events_keep_their_position() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        engine.send_update(HmrUpdate::update("/a.ts", "a", 1));
        engine.send_custom("css-update", json!({"href": "/app.css"}));
        engine.send_update(HmrUpdate::full_reload("/b.ts", 2));
        wait_for_flush().await;

        let messages = socket.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["type"], "update");
        assert_eq!(
            messages[2],
            json!({"type": "custom", "data": {"event": "css-update", "href": "/app.css"}})
        );
        assert_eq!(messages[3]["updates"][0]["type"], "full-reload");
    }

    #[tokio::test]
    async fn flush_delivers_immediately() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        engine.send_custom("ping", Value::Null);
        engine.flush();
        assert_eq!(socket.messages().len(), 2);

        // The cancelled timer must not deliver again
        wait_for_flush().await;
        assert_eq!(socket.messages().len(), 2);
    }

    #[test]
    fn without_runtime_sends_right_away() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        engine.send_update(HmrUpdate::full_reload("/a.ts", 1));
        assert_eq!(socket.messages().len(), 2);
    }
}

mod connections {
    use super::*;

    #[test]
    fn add_sends_connected_and_registers() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        let id = engine.add_connection(socket.clone()).unwrap();

        assert_eq!(socket.messages(), vec![json!({"type": "connected"})]);
        assert_eq!(engine.connections(), vec![id]);
        assert!(engine.remove_connection(id));
        assert!(!engine.remove_connection(id));
        assert_eq!(engine.connection_count(), 0);
    }

    #[test]
    fn failed_handshake_is_not_registered() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        socket.disconnect();

        assert!(matches!(engine.add_connection(socket), Err(HmrError::Connection(_))));
        assert_eq!(engine.connection_count(), 0);
    }

    #[test]
    fn failed_writes_drop_the_connection() {
        let engine = HmrEngine::default();
        let alive = MockSocket::new();
        let broken = MockSocket::new();
        engine.add_connection(alive.clone()).unwrap();
        engine.add_connection(broken.clone()).unwrap();

        broken.break_pipe();
        engine.send_custom("ping", json!({}));

        assert_eq!(engine.connection_count(), 1);
        assert_eq!(alive.messages().len(), 2);
        assert_eq!(broken.messages().len(), 1);
    }

    #[test]
    fn not_open_connections_are_skipped_not_dropped() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        socket.disconnect();
        engine.send_custom("a", json!({}));
        engine.flush();
        assert_eq!(engine.connection_count(), 1);

        socket.reconnect();
        engine.send_custom("b", json!({}));
        engine.flush();

        let messages = socket.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["data"]["event"], "b");
        assert_eq!(engine.connection_count(), 1);
    }

    #[test]
    fn reap_drops_closed_peers() {
        let engine = HmrEngine::default();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        socket.disconnect();
        assert_eq!(engine.reap_connections(), 1);
        assert_eq!(engine.connection_count(), 0);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn close_drops_pending_and_later_messages() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let options = HmrOptions::default().with_on_error(move |e| sink.lock().push(e.to_string()));
        let engine = HmrEngine::new(options).unwrap();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        engine.send_update(HmrUpdate::update("/a.ts", "a", 1));
        engine.close();
        assert!(engine.is_closed());
        assert!(!socket.is_open());

        engine.send_custom("late", json!({}));
        let updates = engine.handle_update("/a.ts").await;
        assert!(updates.is_empty());
        assert_eq!(*errors.lock(), vec!["engine is closed".to_string()]);

        wait_for_flush().await;
        assert_eq!(socket.messages().len(), 1);
        assert_eq!(engine.connection_count(), 0);
        assert!(matches!(engine.add_connection(MockSocket::new()), Err(HmrError::Closed)));
    }

    #[test]
    fn close_is_idempotent() {
        let engine = HmrEngine::default();
        engine.close();
        engine.close();
        assert!(engine.is_closed());
    }
}

mod refresh {
    use super::*;

    const FILE: &str = "/src/Counter.tsx";

    fn counter_app() -> HmrEngine {
        let engine = HmrEngine::default();
        engine
            .register_module("main", "/src/main.ts", ModuleKind::Module, ["Counter"])
            .unwrap();
        engine
            .register_module("Counter", FILE, ModuleKind::Component, NO_DEPS)
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn state_survives_module_swap() {
        let engine = counter_app();
        let before = Counter::with_count(5);
        engine.fast_refresh().register(before, FILE, "hooks:count");

        let updates = engine.handle_update(FILE).await;
        assert_eq!(updates[0].accepted_path.as_deref(), Some("Counter"));

        // The runtime re-creates the component from the new module
        engine.fast_refresh().unregister_file(FILE);
        let after = Counter::with_count(0);
        engine.fast_refresh().register(after.clone(), FILE, "hooks:count");

        let old = exports(json!({"Counter": "v1"}));
        let new = exports(json!({"Counter": "v2"}));
        let outcome = engine
            .complete_refresh(FILE, &old, &new, &Signature::from("hooks:count"))
            .await;

        assert_eq!(outcome, RefreshOutcome::Refreshed { restored: 1 });
        assert_eq!(after.count(), json!(5));
    }

    #[tokio::test]
    async fn changed_exports_fall_back_to_reload() {
        let engine = counter_app();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();

        let old = exports(json!({"Counter": 1}));
        let new = exports(json!({"Counter": 1, "helper": 2}));
        let outcome = engine
            .complete_refresh(FILE, &old, &new, &Signature::from("v1"))
            .await;
        assert_eq!(outcome, RefreshOutcome::FullReload);

        wait_for_flush().await;
        let messages = socket.messages();
        assert_eq!(messages[1]["updates"][0]["type"], "full-reload");
        assert_eq!(messages[1]["updates"][0]["path"], FILE);
    }

    #[tokio::test]
    async fn nothing_restored_without_preserve_state() {
        let options = HmrOptions {
            preserve_state: false,
            ..HmrOptions::default()
        };
        let engine = HmrEngine::new(options).unwrap();
        engine
            .register_module("Counter", FILE, ModuleKind::Component, NO_DEPS)
            .unwrap();
        let counter = Counter::with_count(3);
        engine.fast_refresh().register(counter.clone(), FILE, "v1");

        engine.handle_update(FILE).await;
        counter.write_signal("count", json!(0)).unwrap();

        let shape = exports(json!({"Counter": null}));
        let outcome = engine
            .complete_refresh(FILE, &shape, &shape, &Signature::from("v1"))
            .await;
        assert_eq!(outcome, RefreshOutcome::Refreshed { restored: 0 });
        assert_eq!(counter.count(), json!(0));
    }

    #[tokio::test]
    async fn changed_signature_falls_back_to_reload() {
        let engine = counter_app();
        let socket = MockSocket::new();
        engine.add_connection(socket.clone()).unwrap();
        let counter = Counter::with_count(7);
        engine.fast_refresh().register(counter.clone(), FILE, "hooks:count");

        engine.handle_update(FILE).await;
        engine.fast_refresh().unregister_file(FILE);
        engine
            .fast_refresh()
            .register(Counter::with_count(0), FILE, "hooks:count,step");

        let shape = exports(json!({"Counter": null}));
        let outcome = engine
            .complete_refresh(FILE, &shape, &shape, &Signature::from("hooks:count,step"))
            .await;
        assert_eq!(outcome, RefreshOutcome::FullReload);

        // Shares the batch window with the boundary update
        wait_for_flush().await;
        let messages = socket.messages();
        let entries = messages[1]["updates"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["type"], "update");
        assert_eq!(entries[1]["type"], "full-reload");
        assert_eq!(entries[1]["path"], FILE);
    }

    #[tokio::test]
    async fn signature_checked_against_registrations_without_update() {
        let engine = counter_app();
        engine
            .fast_refresh()
            .register(Counter::with_count(1), FILE, "hooks:count");

        let shape = exports(json!({"Counter": null}));
        let changed = engine
            .complete_refresh(FILE, &shape, &shape, &Signature::from("hooks:other"))
            .await;
        assert_eq!(changed, RefreshOutcome::FullReload);

        let same = engine
            .complete_refresh(FILE, &shape, &shape, &Signature::from("hooks:count"))
            .await;
        assert_eq!(same, RefreshOutcome::Refreshed { restored: 0 });
    }
}
