//! HTTP 输入源：`POST /in`，请求体 `{"data": ...}`。

use crate::common::{default_listen_host, emit};
use crate::error::IngestError;
use async_trait::async_trait;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuleHook, RuntimeError, StateCell, ValidateConfig, Worker, WorkerTasks,
    bind_config, require_non_empty,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

fn default_port() -> u16 {
    8800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSourceConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ValidateConfig for HttpSourceConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        if self.port == 0 {
            return Err(format!("invalid port number: {}", self.port));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InForm {
    #[serde(default)]
    data: Value,
}

#[derive(Clone)]
struct InState {
    uuid: Arc<str>,
    hook: Arc<dyn RuleHook>,
}

/// 字符串原样转发，其它 JSON 值按文本转发。
fn form_text(data: Value) -> String {
    match data {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn receive(
    State(state): State<InState>,
    form: Result<Json<InForm>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let form = match form {
        Ok(Json(form)) => form,
        Err(rejection) => {
            warn!(target: "edge.ingest", uuid = %state.uuid, error = %rejection, "http_in_bad_request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"code": 500, "message": rejection.body_text()})),
            );
        }
    };
    emit(state.hook.as_ref(), &state.uuid, &form_text(form.data)).await;
    (
        StatusCode::OK,
        Json(json!({"code": 200, "message": "success"})),
    )
}

pub struct HttpSource {
    uuid: String,
    config: Option<HttpSourceConfig>,
    hook: Arc<dyn RuleHook>,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl HttpSource {
    pub fn new(hook: Arc<dyn RuleHook>) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            hook,
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }
}

#[async_trait]
impl Worker for HttpSource {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        self.config = Some(bind_config(config)?);
        self.uuid = uuid.to_string();
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.as_ref().ok_or(IngestError::NotStarted)?;
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| IngestError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let app = Router::new().route("/in", post(receive)).with_state(InState {
            uuid: Arc::from(self.uuid.as_str()),
            hook: self.hook.clone(),
        });
        let state = self.state.clone();
        let uuid = self.uuid.clone();
        self.tasks.spawn(async move {
            let shutdown = async move { cancel.cancelled().await };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(target: "edge.ingest", uuid = %uuid, error = %err, "http_in_server_failed");
                state.transition(ResourceState::Down);
            }
        });
        self.state.transition(ResourceState::Up);
        info!(target: "edge.ingest", uuid = %self.uuid, addr = %addr, "http_source_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        self.state.get()
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_text() {
        assert_eq!(form_text(json!("abc")), "abc");
        assert_eq!(form_text(json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(form_text(Value::Null), "");
    }

    #[test]
    fn test_config_defaults() {
        let config: HttpSourceConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8800);
    }
}
