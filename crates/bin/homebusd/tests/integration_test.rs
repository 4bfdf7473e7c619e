//! End-to-end tests for the full homebusd stack.
//!
//! Each test wires the real components (in-memory `SQLite`, device registry,
//! event bus, rule engine, TOML scripts, Xiaomi report handler) the way
//! `main` does. Only the gateway command path binds loopback sockets.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use homebus_adapter_script_toml::TomlScriptEngine;
use homebus_adapter_storage_sqlite_sqlx::device_store::SqliteDeviceStore;
use homebus_adapter_storage_sqlite_sqlx::pool::Config;
use homebus_adapter_xiaomi::{CommandWriter, ReportHandler};
use homebus_app::event_bus::InProcessEventBus;
use homebus_app::ports::{Delivery, DeviceStore};
use homebus_app::rule_engine::RuleEngine;
use homebus_app::scheduler::TimerScheduler;
use homebus_app::services::device_registry::DeviceRegistry;
use homebus_app::trigger_registry::TriggerRegistry;
use homebus_domain::bus::{BusMessage, labels};
use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::error::HubError;
use homebus_domain::id::RuleId;
use homebus_domain::protocol::{DeviceType, SourceProtocol, ValueType};
use homebus_domain::rule::{Event, RuleDefinition, TriggerDefinition};
use homebus_domain::schedule::Schedule;
use homebus_domain::time::now;
use homebus_domain::value::{DeviceValue, DeviceValueChange};
use tokio::net::UdpSocket;

type Registry = Arc<DeviceRegistry<SqliteDeviceStore>>;
type Engine = RuleEngine<TomlScriptEngine, Registry, Arc<InProcessEventBus>>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

async fn store() -> SqliteDeviceStore {
    let db = Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .expect("in-memory database should initialise");
    SqliteDeviceStore::new(db.pool().clone())
}

/// Directory of script files, removed on drop.
struct Scripts(PathBuf);

impl Scripts {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("homebusd-it-{}", RuleId::new()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn write(&self, name: &str, content: &str) -> &Self {
        std::fs::write(self.0.join(format!("{name}.toml")), content).unwrap();
        self
    }
}

impl Drop for Scripts {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Everything published on topics matching a pattern.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(String, BusMessage)>>>);

impl Recorder {
    fn attach(bus: &InProcessEventBus, pattern: &str) -> Self {
        let recorder = Self::default();
        let sink = recorder.clone();
        bus.subscribe(pattern, move |delivery: Delivery| {
            let sink = sink.clone();
            async move {
                sink.0
                    .lock()
                    .unwrap()
                    .push((delivery.topic.to_string(), delivery.message));
                Ok::<(), HubError>(())
            }
        })
        .unwrap();
        recorder
    }

    fn topics(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    fn messages(&self) -> Vec<BusMessage> {
        self.0.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.0.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} deliveries, got {:?}", self.topics());
    }
}

struct Hub {
    registry: Registry,
    bus: Arc<InProcessEventBus>,
    engine: Arc<Engine>,
    xiaomi: ReportHandler<SqliteDeviceStore, Arc<InProcessEventBus>>,
    scheduler: TimerScheduler,
    rule_ids: Vec<(String, RuleId)>,
}

impl Hub {
    async fn start(definitions: Vec<RuleDefinition>, scripts: &Scripts) -> Self {
        let registry = Arc::new(DeviceRegistry::new(store().await));
        let bus = Arc::new(InProcessEventBus::new());
        let mut scheduler = TimerScheduler::new();
        let triggers = TriggerRegistry::load(definitions, &mut scheduler);
        let rule_ids = triggers
            .rules()
            .iter()
            .map(|rule| (rule.name.clone(), rule.id))
            .collect();
        let engine = Arc::new(RuleEngine::new(
            triggers,
            TomlScriptEngine::new(&scripts.0),
            Arc::clone(&registry),
            Arc::clone(&bus),
        ));
        engine.subscribe(&bus).unwrap();
        let xiaomi = ReportHandler::new(Arc::clone(&registry), Arc::clone(&bus));

        Self {
            registry,
            bus,
            engine,
            xiaomi,
            scheduler,
            rule_ids,
        }
    }

    fn rule_id(&self, name: &str) -> RuleId {
        self.rule_ids
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .unwrap()
    }
}

fn rule(name: &str, trigger: TriggerDefinition) -> RuleDefinition {
    RuleDefinition {
        name: name.into(),
        script: None,
        triggers: vec![trigger],
    }
}

fn report(cmd: &str, model: &str, sid: &str, data: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "cmd": cmd,
        "model": model,
        "sid": sid,
        "data": data.to_string(),
    }))
    .unwrap()
}

const LIGHT_ON: &str = r#"
    [[action]]
    type = "log"
    message = "{trigger} on {device}, switching hall light on"

    [[action]]
    type = "publish_command"
    topic = "command.device.noolite"
    protocol = "noolite"
    channel = "5"
    label = "TurnOn"
    data = { level = 100 }
"#;

// ---------------------------------------------------------------------------
// Device discovery and rule execution
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_register_unseen_xiaomi_device_and_announce_it() {
    let scripts = Scripts::new();
    let hub = Hub::start(Vec::new(), &scripts).await;
    let events = Recorder::attach(&hub.bus, "event.*");

    hub.xiaomi
        .handle_datagram(&report("heartbeat", "", "55", &serde_json::json!({})))
        .await
        .unwrap();
    events.wait_for(1).await;

    let device = hub.registry.get_device(SourceProtocol::Xiaomi, "55").unwrap();
    assert_eq!(device.channel, "55");
    assert_eq!(device.protocol, SourceProtocol::Xiaomi);
    assert_eq!(device.device_type, DeviceType::Unknown);
    assert_eq!(events.topics(), vec!["event.device.added"]);
    assert_eq!(
        events.messages()[0],
        BusMessage::protocol(&device.key(), labels::DEVICE_ADDED)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_run_change_rule_when_motion_is_reported() {
    let scripts = Scripts::new();
    scripts.write("hall_light", LIGHT_ON);
    let hub = Hub::start(
        vec![rule(
            "hall_light",
            TriggerDefinition::Change {
                device: "xiaomi/channel/55".into(),
                value: Some("motion".into()),
            },
        )],
        &scripts,
    )
    .await;
    let commands = Recorder::attach(&hub.bus, "command.*");

    hub.xiaomi
        .handle_datagram(&report("heartbeat", "", "55", &serde_json::json!({})))
        .await
        .unwrap();
    hub.xiaomi
        .handle_datagram(&report(
            "report",
            "sensor_motion.aq2",
            "55",
            &serde_json::json!({"status": "motion"}),
        ))
        .await
        .unwrap();
    commands.wait_for(1).await;

    let device = hub.registry.get_device(SourceProtocol::Xiaomi, "55").unwrap();
    let motion = device.value("motion").unwrap();
    assert_eq!(motion.current_value(), Some("true"));
    assert_eq!(motion.value_type, ValueType::Trigger);
    assert_eq!(commands.topics(), vec!["command.device.noolite"]);
    assert_eq!(
        commands.messages()[0],
        BusMessage::command(
            &DeviceKey::new(SourceProtocol::Noolite, "5"),
            "TurnOn",
            serde_json::json!({"level": 100})
        )
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_write_rule_command_to_xiaomi_gateway() {
    let scripts = Scripts::new();
    scripts.write(
        "porch_light",
        r#"
        [[action]]
        type = "publish_command"
        topic = "command.device.xiaomi"
        protocol = "xiaomi"
        channel = "158d0002"
        label = "TurnOn"
        data = { subchannel = 2 }
        "#,
    );
    let hub = Hub::start(
        vec![rule(
            "porch_light",
            TriggerDefinition::Change {
                device: "xiaomi/channel/77".into(),
                value: Some("opened".into()),
            },
        )],
        &scripts,
    )
    .await;
    let gateway = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let local = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    Arc::new(CommandWriter::new(local, Some(gateway.local_addr().unwrap())))
        .subscribe(&hub.bus)
        .unwrap();

    hub.xiaomi
        .handle_datagram(&report("report", "magnet", "77", &serde_json::json!({"status": "open"})))
        .await
        .unwrap();

    let mut buffer = vec![0_u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), gateway.recv_from(&mut buffer))
        .await
        .expect("gateway should receive a write")
        .unwrap();
    let request: serde_json::Value = serde_json::from_slice(&buffer[..len]).unwrap();
    assert_eq!(request["cmd"], "write");
    assert_eq!(request["sid"], "158d0002");
    let data: serde_json::Value = serde_json::from_str(request["data"].as_str().unwrap()).unwrap();
    assert_eq!(data, serde_json::json!({"channel_1": "on"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_store_one_device_for_concurrent_first_sightings() {
    let store = store().await;
    let registry = Arc::new(DeviceRegistry::new(store.clone()));
    let key = DeviceKey::new(SourceProtocol::Xiaomi, "158d0001");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            tokio::spawn(async move {
                registry
                    .add_or_update_device(Device::builder().key(key).build().unwrap())
                    .await
                    .unwrap()
                    .id
            })
        })
        .collect();
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }

    assert!(ids.iter().all(|id| *id == ids[0]));
    let stored = store.find_by_protocol(SourceProtocol::Xiaomi).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, ids[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_store_one_device_when_two_registries_race() {
    let store = store().await;
    let first = DeviceRegistry::new(store.clone());
    let second = DeviceRegistry::new(store.clone());
    let key = DeviceKey::new(SourceProtocol::Xiaomi, "158d0002");

    let (a, b) = tokio::join!(
        first.add_or_update_device(Device::builder().key(key.clone()).build().unwrap()),
        second.add_or_update_device(Device::builder().key(key.clone()).build().unwrap()),
    );

    assert_eq!(a.unwrap().id, b.unwrap().id);
    assert_eq!(store.find_by_protocol(SourceProtocol::Xiaomi).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Timers and startup
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_run_only_matching_time_rules_on_timer_event() {
    let scripts = Scripts::new();
    scripts
        .write("morning", "[[action]]\ntype = \"log\"\nmessage = \"{trigger}\"\n")
        .write("evening", "[[action]]\ntype = \"log\"\nmessage = \"{trigger}\"\n")
        .write("hall_light", LIGHT_ON);
    let hub = Hub::start(
        vec![
            rule(
                "morning",
                TriggerDefinition::Time {
                    schedule: "daily 06:00".into(),
                },
            ),
            rule(
                "evening",
                TriggerDefinition::Time {
                    schedule: "daily 21:30".into(),
                },
            ),
            rule(
                "hall_light",
                TriggerDefinition::Change {
                    device: "xiaomi/channel/55".into(),
                    value: None,
                },
            ),
        ],
        &scripts,
    )
    .await;

    let morning = Schedule::parse("daily 06:00").unwrap();
    assert_eq!(hub.scheduler.schedules().len(), 2);
    assert!(hub.scheduler.schedules().contains(&morning));

    let report = hub.engine.dispatch(&Event::timer(morning));

    assert_eq!(report.executed, vec![hub.rule_id("morning")]);
    assert!(report.failed.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_run_startup_rules_once_and_isolate_failures() {
    let scripts = Scripts::new();
    scripts.write("boot", "[[action]]\ntype = \"log\"\nmessage = \"started\"\n");
    let hub = Hub::start(
        vec![
            RuleDefinition {
                name: "broken".into(),
                script: Some("missing_script".into()),
                triggers: vec![TriggerDefinition::Startup],
            },
            rule("boot", TriggerDefinition::Startup),
        ],
        &scripts,
    )
    .await;

    let first = hub.engine.run_startup_rules();
    let second = hub.engine.run_startup_rules();

    assert_eq!(first.failed, vec![hub.rule_id("broken")]);
    assert_eq!(first.executed, vec![hub.rule_id("boot")]);
    assert!(second.is_empty());
}

// ---------------------------------------------------------------------------
// History retention
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_prune_stale_voltage_history_and_keep_current_value() {
    let store = store().await;
    let device = store
        .save(
            &Device::builder()
                .key(DeviceKey::new(SourceProtocol::Noolite, "5"))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let voltage = DeviceValue::new("voltage", ValueType::Double);
    for (days, raw) in [(90, "3.10"), (60, "3.05")] {
        store
            .append_change(
                device.id,
                &voltage,
                &DeviceValueChange::new(now() - chrono::Duration::days(days), raw),
            )
            .await
            .unwrap();
    }
    let registry = DeviceRegistry::new(store.clone());
    registry.load().await.unwrap();
    registry
        .add_change(&device.key(), "voltage", "3.01", ValueType::Double)
        .await
        .unwrap();

    let deleted = registry
        .delete_history(
            SourceProtocol::Noolite,
            "5",
            "voltage",
            now() - chrono::Duration::days(30),
        )
        .await
        .unwrap();

    assert_eq!(deleted, 2);
    let stored = store.find_by_key(&device.key()).await.unwrap().unwrap();
    let history = &stored.value("voltage").unwrap().changes;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].value, "3.01");
    let cached = registry.get_device(SourceProtocol::Noolite, "5").unwrap();
    assert_eq!(cached.value("voltage").unwrap().current_value(), Some("3.01"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_keep_current_value_even_when_stale() {
    let store = store().await;
    let device = store
        .save(
            &Device::builder()
                .key(DeviceKey::new(SourceProtocol::Noolite, "5"))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let voltage = DeviceValue::new("voltage", ValueType::Double);
    for (days, raw) in [(90, "3.10"), (60, "3.05")] {
        store
            .append_change(
                device.id,
                &voltage,
                &DeviceValueChange::new(now() - chrono::Duration::days(days), raw),
            )
            .await
            .unwrap();
    }
    let registry = DeviceRegistry::new(store.clone());
    registry.load().await.unwrap();

    let deleted = registry
        .delete_history(
            SourceProtocol::Noolite,
            "5",
            "voltage",
            now() - chrono::Duration::days(30),
        )
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    let cached = registry.get_device(SourceProtocol::Noolite, "5").unwrap();
    assert_eq!(cached.value("voltage").unwrap().current_value(), Some("3.05"));
}
