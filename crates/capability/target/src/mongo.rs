//! MongoDB 目标：Extended JSON 写成单条文档。

use crate::common::{Deliver, OfflineCache, TargetDeps, default_true};
use crate::error::TargetError;
use async_trait::async_trait;
use bson::{Bson, Document, doc};
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
    require_non_empty,
};
use mongodb::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

fn default_name() -> String {
    "rhilex".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConfig {
    pub mongo_url: String,
    #[serde(default = "default_name")]
    pub database: String,
    #[serde(default = "default_name")]
    pub collection: String,
    #[serde(default = "default_true")]
    pub cache_offline_data: bool,
}

impl ValidateConfig for MongoConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("mongoUrl", &self.mongo_url)?;
        require_non_empty("database", &self.database)?;
        require_non_empty("collection", &self.collection)
    }
}

/// 解析 Extended JSON 对象。
pub fn parse_document(data: &str) -> Result<Document, TargetError> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| TargetError::InvalidData(format!("invalid json: {}", e)))?;
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(TargetError::InvalidData(format!(
            "expect json object, got {:?}",
            other.element_type()
        ))),
        Err(err) => Err(TargetError::InvalidData(err.to_string())),
    }
}

pub struct MongoTarget {
    uuid: String,
    config: Option<MongoConfig>,
    client: Mutex<Option<Client>>,
    cache: OfflineCache,
    state: StateCell,
}

impl MongoTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            client: Mutex::new(None),
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }

    fn client(&self) -> Result<(Client, &MongoConfig), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let client = self
            .client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(TargetError::NotConnected)?;
        Ok((client, config))
    }

    async fn ping(&self) -> Result<(), TargetError> {
        let (client, config) = self.client()?;
        let database = client.database(&config.database);
        let ping = database.run_command(doc! {"ping": 1}, None);
        match tokio::time::timeout(PING_TIMEOUT, ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(TargetError::Remote(err.to_string())),
            Err(_) => Err(TargetError::Timeout(PING_TIMEOUT.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl Deliver for MongoTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let document = parse_document(data)?;
        let (client, config) = self.client()?;
        client
            .database(&config.database)
            .collection::<Document>(&config.collection)
            .insert_one(document, None)
            .await
            .map(|_| ())
            .map_err(|e| TargetError::Remote(e.to_string()))
    }
}

#[async_trait]
impl Worker for MongoTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: MongoConfig = bind_config(config)?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, _cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let client = Client::with_uri_str(&config.mongo_url)
            .await
            .map_err(|e| TargetError::Remote(e.to_string()))?;
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = Some(client);
        self.ping().await?;
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, database = %config.database, "mongo_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        match self.ping().await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "mongo_probe_failed");
                self.state.transition(ResourceState::Down);
                ResourceState::Down
            }
        }
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.client.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for MongoTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extended_json() {
        let document =
            parse_document(r#"{"v": {"$numberLong": "42"}, "at": {"$date": {"$numberLong": "0"}}}"#)
                .unwrap();
        assert_eq!(document.get_i64("v").unwrap(), 42);
        assert!(document.get_datetime("at").is_ok());
        assert!(parse_document("[1,2]").is_err());
        assert!(parse_document("nope").is_err());
    }
}
