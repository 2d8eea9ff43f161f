use async_trait::async_trait;
use domain::{ConfigMap, ResourceKind, ResourceState};
use edge_runtime::{
    CancelToken, Controllable, InterCache, ResourceManager, RuntimeError, Runtimes, StateCell,
    Target, Worker, WorkerTasks, DEVICE_SLOT,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Counters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    written: Mutex<Vec<String>>,
}

#[derive(Clone, Copy)]
enum Mode {
    Healthy,
    AlwaysDown,
    PanicOnStart,
    SlowStart,
}

struct CountingWorker {
    counters: Arc<Counters>,
    mode: Mode,
    state: StateCell,
    tasks: WorkerTasks,
}

impl CountingWorker {
    fn boxed(counters: Arc<Counters>, mode: Mode) -> Box<dyn Worker> {
        Box::new(Self {
            counters,
            mode,
            state: StateCell::default(),
            tasks: WorkerTasks::new(),
        })
    }
}

#[async_trait]
impl Worker for CountingWorker {
    async fn init(&mut self, _uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        if config.contains_key("broken") {
            return Err(RuntimeError::Config("broken config".to_string()));
        }
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.state.begin_start();
        match self.mode {
            Mode::PanicOnStart => panic!("boom"),
            Mode::SlowStart => tokio::time::sleep(Duration::from_millis(300)).await,
            _ => {}
        }
        self.tasks.spawn(async move { cancel.cancelled().await });
        self.state.transition(ResourceState::Up);
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        match self.mode {
            Mode::AlwaysDown => ResourceState::Down,
            _ => self.state.get(),
        }
    }

    async fn stop(&self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(100)).await;
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }

    fn as_controllable(&self) -> Option<&dyn Controllable> {
        Some(self)
    }
}

#[async_trait]
impl Target for CountingWorker {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.counters.written.lock().unwrap().push(data.to_string());
        Ok(())
    }
}

#[async_trait]
impl Controllable for CountingWorker {
    async fn on_ctrl(&self, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        match cmd {
            "Echo" => Ok(args.to_vec()),
            other => Err(RuntimeError::UnsupportedCommand(other.to_string())),
        }
    }
}

fn manager_with(mode: Mode) -> (ResourceManager, Arc<Counters>) {
    let manager = ResourceManager::new(ResourceKind::Device);
    let counters = Arc::new(Counters::default());
    let shared = counters.clone();
    manager.register_type("X", move |_config: &ConfigMap| Ok(CountingWorker::boxed(shared.clone(), mode)));
    (manager, counters)
}

#[tokio::test]
async fn load_monitor_then_stop() {
    let (manager, counters) = manager_with(Mode::Healthy);
    manager.load("u1", "n", "X", ConfigMap::new(), "").await.unwrap();
    assert_eq!(manager.get_status("u1").await.unwrap(), ResourceState::Pending);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 0);

    let monitor = manager.start_monitoring(Duration::from_millis(50));
    let mut up = false;
    for _ in 0..120 {
        if manager.get_status("u1").await.unwrap() == ResourceState::Up {
            up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(up, "worker did not reach UP");

    manager.stop("u1").await.unwrap();
    assert!(!manager.has("u1"));
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    let err = manager.get_status("u1").await.unwrap_err();
    assert_eq!(err.to_string(), "resource not found: u1");
    monitor.abort();
}

#[tokio::test]
async fn down_worker_restarted_every_tick() {
    let (manager, counters) = manager_with(Mode::AlwaysDown);
    manager.load("u1", "n", "X", ConfigMap::new(), "").await.unwrap();

    manager.supervise_once().await;
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

    for tick in 1..=3 {
        manager.supervise_once().await;
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1 + tick);
        assert_eq!(counters.stops.load(Ordering::SeqCst), tick);
    }
}

#[tokio::test]
async fn unknown_type_and_duplicate_uuid_rejected() {
    let (manager, _counters) = manager_with(Mode::Healthy);
    let err = manager
        .load("u1", "n", "NOPE", ConfigMap::new(), "")
        .await
        .unwrap_err();
    assert_eq!(err, RuntimeError::UnsupportedType("NOPE".to_string()));

    manager.load("u1", "n", "X", ConfigMap::new(), "").await.unwrap();
    let err = manager
        .load("u1", "n", "X", ConfigMap::new(), "")
        .await
        .unwrap_err();
    assert_eq!(err, RuntimeError::AlreadyExists("u1".to_string()));
}

#[tokio::test]
async fn init_failure_releases_uuid() {
    let (manager, _counters) = manager_with(Mode::Healthy);
    let mut config = ConfigMap::new();
    config.insert("broken".to_string(), json!(true));
    assert!(manager.load("u1", "n", "X", config, "").await.is_err());
    assert!(!manager.has("u1"));
    manager.load("u1", "n", "X", ConfigMap::new(), "").await.unwrap();
}

#[tokio::test]
async fn panic_in_start_reads_as_down() {
    let (manager, counters) = manager_with(Mode::PanicOnStart);
    manager.load("u1", "n", "X", ConfigMap::new(), "").await.unwrap();
    let err = manager.restart("u1").await.unwrap_err();
    assert_eq!(err, RuntimeError::Panicked("u1".to_string()));
    assert_eq!(manager.get_status("u1").await.unwrap(), ResourceState::Down);

    manager.supervise_once().await;
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn tick_skips_worker_mid_start() {
    let (manager, counters) = manager_with(Mode::SlowStart);
    manager.load("u1", "n", "X", ConfigMap::new(), "").await.unwrap();

    let restarting = manager.clone();
    let first = tokio::spawn(async move { restarting.restart("u1").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.supervise_once().await;
    first.await.unwrap().unwrap();
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stopped_worker_removed_by_supervisor() {
    let (manager, _counters) = manager_with(Mode::Healthy);
    manager.load("a", "n", "X", ConfigMap::new(), "").await.unwrap();
    manager.load("b", "n", "X", ConfigMap::new(), "").await.unwrap();
    manager.supervise_once().await;

    let worker = manager.get_worker("a").unwrap();
    worker.stop().await;
    assert_eq!(manager.get_status("a").await.unwrap(), ResourceState::Stop);

    manager.supervise_once().await;
    assert!(!manager.has("a"));
    let list = manager.get_list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].uuid, "b");
    assert_eq!(list[0].state, ResourceState::Up);
}

#[tokio::test]
async fn disabled_worker_stopped_then_removed() {
    let (manager, counters) = manager_with(Mode::Healthy);
    manager.load("a", "n", "X", ConfigMap::new(), "").await.unwrap();
    manager.load("b", "n", "X", ConfigMap::new(), "").await.unwrap();
    manager.supervise_once().await;
    assert_eq!(manager.get_status("a").await.unwrap(), ResourceState::Up);

    manager.disable("a").await.unwrap();
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_status("a").await.unwrap(), ResourceState::Disable);
    assert_eq!(
        manager.get_details("a").await.unwrap().state,
        ResourceState::Disable
    );

    manager.supervise_once().await;
    assert!(!manager.has("a"));
    assert_eq!(
        manager.get_status("a").await.unwrap_err(),
        RuntimeError::NotFound("a".to_string())
    );
    // 未被重新启动
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
    assert_eq!(manager.get_status("b").await.unwrap(), ResourceState::Up);

    // uuid 已释放，可重新装载
    manager.load("a", "n", "X", ConfigMap::new(), "").await.unwrap();
    assert_eq!(
        manager.disable("missing").await.unwrap_err(),
        RuntimeError::NotFound("missing".to_string())
    );
}

#[tokio::test]
async fn restart_clears_disable() {
    let (manager, _counters) = manager_with(Mode::Healthy);
    manager.load("a", "n", "X", ConfigMap::new(), "").await.unwrap();
    manager.disable("a").await.unwrap();
    assert_eq!(manager.get_status("a").await.unwrap(), ResourceState::Disable);

    manager.restart("a").await.unwrap();
    assert_eq!(manager.get_status("a").await.unwrap(), ResourceState::Up);
    manager.supervise_once().await;
    assert!(manager.has("a"));
}

#[tokio::test]
async fn facades_bind_slots_and_dispatch() {
    let intercache = Arc::new(InterCache::new());
    let runtimes = Runtimes::new(intercache.clone());
    let counters = Arc::new(Counters::default());
    for runtime in [&*runtimes.devices, &*runtimes.targets] {
        let shared = counters.clone();
        runtime
            .manager()
            .register_type("X", move |_config: &ConfigMap| {
                Ok(CountingWorker::boxed(shared.clone(), Mode::Healthy))
            });
    }

    runtimes.devices.load("d1", "dev", "X", ConfigMap::new(), "").await.unwrap();
    assert_eq!(intercache.get(DEVICE_SLOT, "d1").unwrap().value["type"], "X");

    // uuid 在所有类别间唯一
    let err = runtimes
        .targets
        .load("d1", "t", "X", ConfigMap::new(), "")
        .await
        .unwrap_err();
    assert_eq!(err, RuntimeError::AlreadyExists("d1".to_string()));

    runtimes.targets.load("t1", "t", "X", ConfigMap::new(), "").await.unwrap();
    runtimes.targets.to("t1", "hello").await.unwrap();
    assert_eq!(*counters.written.lock().unwrap(), vec!["hello".to_string()]);

    let reply = runtimes.devices.on_ctrl("d1", "Echo", b"ping").await.unwrap();
    assert_eq!(reply, b"ping".to_vec());
    let err = runtimes.devices.on_ctrl("d1", "Nope", b"").await.unwrap_err();
    assert_eq!(err.to_string(), "unsupported command: Nope");

    runtimes.devices.restart("d1").await.unwrap();
    assert_eq!(
        intercache.get(DEVICE_SLOT, "d1").unwrap().status,
        ResourceState::Up
    );

    runtimes.shutdown().await;
    assert!(intercache.get(DEVICE_SLOT, "d1").is_none());
    assert!(runtimes.targets.get_list().await.is_empty());
}
