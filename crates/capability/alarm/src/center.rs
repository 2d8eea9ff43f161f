use crate::error::AlarmError;
use crate::expr::AlarmExpr;
use crate::rule::AlarmRule;
use domain::{OrderedMap, now_epoch_ms};
use edge_runtime::{CancelToken, TargetRuntime};
use edge_storage::{AlarmLogRecord, AlarmLogStore};
use edge_telemetry::record_alarm_fired;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 告警队列容量。
pub const ALARM_QUEUE_CAPACITY: usize = 1024;

/// 告警日志批量落库周期。
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

fn default_threshold() -> u64 {
    1
}

fn default_interval() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExprDefine {
    pub expr: String,
    pub event_type: String,
}

/// 告警规则配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRuleConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    /// 最小触发间隔（秒）
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// 触发后接收事件类型的输出目标
    #[serde(default)]
    pub handle_id: String,
    #[serde(default)]
    pub expr_defines: Vec<ExprDefine>,
}

struct LoadedRule {
    handle_id: String,
    exprs: Vec<(AlarmExpr, String)>,
    state: Mutex<AlarmRule>,
}

impl LoadedRule {
    fn compile(config: &AlarmRuleConfig) -> Result<Self, AlarmError> {
        let exprs = config
            .expr_defines
            .iter()
            .map(|define| Ok((AlarmExpr::parse(&define.expr)?, define.event_type.clone())))
            .collect::<Result<Vec<_>, AlarmError>>()?;
        Ok(Self {
            handle_id: config.handle_id.clone(),
            exprs,
            state: Mutex::new(AlarmRule::new(
                config.threshold,
                Duration::from_secs(config.interval),
            )),
        })
    }

    fn add_log(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_log()
    }
}

struct AlarmEvent {
    record: AlarmLogRecord,
    handle_id: String,
}

/// 告警中心：规则注册表 + 告警队列 + 批量落库任务。
pub struct AlarmCenter {
    rules: OrderedMap<String, Arc<LoadedRule>>,
    tx: mpsc::Sender<AlarmEvent>,
    cancel: CancelToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmCenter {
    /// 创建告警中心并启动后台落库任务，需在 tokio 运行时内调用。
    pub fn spawn(store: Arc<dyn AlarmLogStore>, targets: TargetRuntime) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(ALARM_QUEUE_CAPACITY);
        let cancel = CancelToken::new();
        let flusher = tokio::spawn(run_flusher(rx, store, targets, cancel.clone()));
        Arc::new(Self {
            rules: OrderedMap::new(),
            tx,
            cancel,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    pub fn load_rule(&self, rule_id: &str, config: &AlarmRuleConfig) -> Result<(), AlarmError> {
        let rule = LoadedRule::compile(config)?;
        self.rules.set(rule_id.to_string(), Arc::new(rule));
        info!(
            target: "edge.alarm",
            rule_id = %rule_id,
            threshold = config.threshold,
            interval_secs = config.interval,
            exprs = config.expr_defines.len(),
            "alarm_rule_loaded"
        );
        Ok(())
    }

    /// 重新加载：计数与上次触发时间一并清零。
    pub fn reload_rule(&self, rule_id: &str, config: &AlarmRuleConfig) -> Result<(), AlarmError> {
        let rule = LoadedRule::compile(config)?;
        self.rules.delete(&rule_id.to_string());
        self.rules.set(rule_id.to_string(), Arc::new(rule));
        info!(target: "edge.alarm", rule_id = %rule_id, "alarm_rule_reloaded");
        Ok(())
    }

    pub fn remove_rule(&self, rule_id: &str) -> bool {
        self.rules.delete(&rule_id.to_string()).is_some()
    }

    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.keys()
    }

    /// 清空注册表。
    pub fn flush_rules(&self) {
        self.rules.clear();
    }

    /// 用数据匹配规则的全部表达式，返回本次进入告警队列的事件数。
    pub fn input(
        &self,
        rule_id: &str,
        source: &str,
        data: &Map<String, Value>,
    ) -> Result<usize, AlarmError> {
        let rule = self
            .rules
            .get(&rule_id.to_string())
            .ok_or_else(|| AlarmError::RuleNotFound(rule_id.to_string()))?;
        let info = Value::Object(data.clone()).to_string();
        debug!(target: "edge.alarm", rule_id = %rule_id, source = %source, data = %info, "alarm_input");

        let mut queued = 0;
        for (expr, event_type) in &rule.exprs {
            if !expr.eval(data) || !rule.add_log() {
                continue;
            }
            let event = AlarmEvent {
                record: AlarmLogRecord {
                    uuid: uuid::Uuid::new_v4().to_string(),
                    ts: now_epoch_ms(),
                    rule_id: rule_id.to_string(),
                    source: source.to_string(),
                    event_type: event_type.clone(),
                    summary: summary(event_type, source),
                    info: info.clone(),
                },
                handle_id: rule.handle_id.clone(),
            };
            match self.tx.try_send(event) {
                Ok(()) => {
                    record_alarm_fired();
                    queued += 1;
                }
                Err(TrySendError::Full(_)) => {
                    warn!(target: "edge.alarm", rule_id = %rule_id, event_type = %event_type, "alarm_queue_full");
                }
                Err(TrySendError::Closed(_)) => return Err(AlarmError::QueueClosed),
            }
        }
        Ok(queued)
    }

    /// 校验表达式语法。
    pub fn verify_expr(expr: &str) -> Result<(), AlarmError> {
        AlarmExpr::parse(expr).map(|_| ())
    }

    /// 用样例数据试运行表达式。
    pub fn test_expr(expr: &str, data: &Map<String, Value>) -> Result<bool, AlarmError> {
        Ok(AlarmExpr::parse(expr)?.eval(data))
    }

    /// 停止后台任务，队列中剩余的日志会先落库。
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.flush_rules();
    }
}

fn summary(event_type: &str, source: &str) -> String {
    format!("EventType:[ {} ] | Source:[ {} ]", event_type, source)
}

fn forward(targets: &TargetRuntime, event: &AlarmEvent) {
    if event.handle_id.is_empty() || !targets.manager().has(&event.handle_id) {
        return;
    }
    let targets = targets.clone();
    let handle_id = event.handle_id.clone();
    let event_type = event.record.event_type.clone();
    tokio::spawn(async move {
        // 失败已在 TargetRuntime::to 中记录
        let _ = targets.to(&handle_id, &event_type).await;
    });
}

async fn flush(store: &dyn AlarmLogStore, buffer: &mut Vec<AlarmLogRecord>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    match store.append_batch(&batch).await {
        Ok(()) => debug!(target: "edge.alarm", rows = batch.len(), "alarm_logs_flushed"),
        Err(err) => {
            warn!(target: "edge.alarm", rows = batch.len(), error = %err, "alarm_logs_flush_failed")
        }
    }
}

async fn run_flusher(
    mut rx: mpsc::Receiver<AlarmEvent>,
    store: Arc<dyn AlarmLogStore>,
    targets: TargetRuntime,
    cancel: CancelToken,
) {
    let mut buffer = Vec::new();
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => {
                    forward(&targets, &event);
                    buffer.push(event.record);
                }
                None => break,
            },
            _ = ticker.tick() => flush(store.as_ref(), &mut buffer).await,
        }
    }
    while let Ok(event) = rx.try_recv() {
        buffer.push(event.record);
    }
    flush(store.as_ref(), &mut buffer).await;
    info!(target: "edge.alarm", "alarm_center_stopped");
}
