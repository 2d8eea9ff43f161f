//! 邮件目标：每条数据作为一封纯文本邮件的正文发送。

use crate::common::{Deliver, OfflineCache, TargetDeps, probe_tcp};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
    require_non_empty,
};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const IMPLICIT_TLS_PORT: u16 = 465;

fn default_port() -> u16 {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub subject: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for SmtpConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("server", &self.server)?;
        self.from
            .parse::<Mailbox>()
            .map_err(|e| format!("invalid from: {}", e))?;
        self.to
            .parse::<Mailbox>()
            .map_err(|e| format!("invalid to: {}", e))?;
        Ok(())
    }
}

impl SmtpConfig {
    /// 组装一封邮件。
    pub fn message(&self, body: &str) -> Result<Message, TargetError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| TargetError::InvalidData(format!("invalid from: {}", e)))?;
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|e| TargetError::InvalidData(format!("invalid to: {}", e)))?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .body(body.to_string())
            .map_err(|e| TargetError::InvalidData(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)
        }
        .map_err(|e| e.to_string())?;
        let mut builder = builder.port(self.port).timeout(Some(Duration::from_secs(10)));
        if !self.user.is_empty() {
            builder = builder
                .credentials(Credentials::new(self.user.clone(), self.password.clone()))
                .authentication(vec![Mechanism::Plain]);
        }
        Ok(builder.build())
    }
}

pub struct SmtpTarget {
    uuid: String,
    config: Option<SmtpConfig>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    cache: OfflineCache,
    state: StateCell,
}

impl SmtpTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            transport: None,
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }
}

#[async_trait]
impl Deliver for SmtpTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let transport = self.transport.as_ref().ok_or(TargetError::NotConnected)?;
        transport
            .send(config.message(data)?)
            .await
            .map(|_| ())
            .map_err(|e| TargetError::Remote(e.to_string()))
    }
}

#[async_trait]
impl Worker for SmtpTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: SmtpConfig = bind_config(config)?;
        self.transport = Some(config.transport().map_err(RuntimeError::Config)?);
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, _cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, "smtp_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        let Some(config) = self.config.as_ref() else {
            return ResourceState::Down;
        };
        let addr = format!("{}:{}", config.server, config.port);
        match probe_tcp(&addr, Duration::from_secs(3)).await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "smtp_probe_failed");
                self.state.transition(ResourceState::Down);
                ResourceState::Down
            }
        }
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for SmtpTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_headers() {
        let map = json!({
            "server": "smtp.example.com",
            "from": "gateway@example.com",
            "to": "ops@example.com",
            "subject": "alarm"
        });
        let config: SmtpConfig = bind_config(map.as_object().unwrap()).unwrap();
        let raw = String::from_utf8(config.message("pump stopped").unwrap().formatted()).unwrap();
        assert!(raw.contains("Subject: alarm"));
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("pump stopped"));
    }

    #[test]
    fn test_invalid_mailbox_rejected() {
        let map = json!({"server": "s", "from": "nobody", "to": "ops@example.com"});
        assert!(bind_config::<SmtpConfig>(map.as_object().unwrap()).is_err());
    }
}
