use crate::error::CecollaError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 上行通道抽象，收发均为 QoS 1。
#[async_trait]
pub trait Uplink: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), CecollaError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), CecollaError>;

    fn is_connected(&self) -> bool;
}

/// rumqttc 客户端实现，连接标志由事件循环维护。
#[derive(Clone)]
pub struct MqttUplink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttUplink {
    pub fn new(client: AsyncClient, connected: Arc<AtomicBool>) -> Self {
        Self { client, connected }
    }
}

#[async_trait]
impl Uplink for MqttUplink {
    async fn subscribe(&self, topic: &str) -> Result<(), CecollaError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), CecollaError> {
        if !self.is_connected() {
            return Err(CecollaError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
