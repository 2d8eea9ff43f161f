use crate::error::RuntimeError;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleEventKind {
    InEnd,
    Device,
    Cecolla,
}

/// 送往规则引擎的事件。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvent {
    pub kind: RuleEventKind,
    pub uuid: String,
    pub data: String,
}

/// 规则引擎入口。规则本身不在网关核心内执行。
#[async_trait]
pub trait RuleHook: Send + Sync {
    async fn work_in_end(&self, uuid: &str, data: &str) -> Result<(), RuntimeError>;

    async fn work_device(&self, uuid: &str, data: &str) -> Result<(), RuntimeError>;

    async fn work_cecolla(&self, uuid: &str, data: &str) -> Result<(), RuntimeError>;
}

#[derive(Debug, Default, Clone)]
pub struct NoopRuleHook;

#[async_trait]
impl RuleHook for NoopRuleHook {
    async fn work_in_end(&self, _uuid: &str, _data: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn work_device(&self, _uuid: &str, _data: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn work_cecolla(&self, _uuid: &str, _data: &str) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// 把事件转发到通道，由外部规则引擎消费。
#[derive(Debug, Clone)]
pub struct ChannelRuleHook {
    tx: mpsc::Sender<RuleEvent>,
}

impl ChannelRuleHook {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RuleEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn forward(&self, kind: RuleEventKind, uuid: &str, data: &str) -> Result<(), RuntimeError> {
        self.tx
            .send(RuleEvent {
                kind,
                uuid: uuid.to_string(),
                data: data.to_string(),
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }
}

#[async_trait]
impl RuleHook for ChannelRuleHook {
    async fn work_in_end(&self, uuid: &str, data: &str) -> Result<(), RuntimeError> {
        self.forward(RuleEventKind::InEnd, uuid, data).await
    }

    async fn work_device(&self, uuid: &str, data: &str) -> Result<(), RuntimeError> {
        self.forward(RuleEventKind::Device, uuid, data).await
    }

    async fn work_cecolla(&self, uuid: &str, data: &str) -> Result<(), RuntimeError> {
        self.forward(RuleEventKind::Cecolla, uuid, data).await
    }
}
