//! # 南向输入源
//!
//! 输入源是只产生数据的 Worker：收到的每条数据经 `RuleHook::work_in_end`
//! 交给规则引擎，并计入 `inbound_events`。
//!
//! | 类型 | 模块 | 事件格式 |
//! |------|------|----------|
//! | `GENERIC_MQTT` | `mqtt` | `{"topic","payload"}` |
//! | `HTTP` | `http` | 请求体中的 `data` |
//! | `GENERIC_TCP` | `tcp` | `{"clientAddr","data"}` |
//! | `GENERIC_UDP` | `udp` | `{"clientAddr","data"}` |

mod common;
mod error;
pub mod http;
pub mod mqtt;
pub mod tcp;
pub mod udp;

pub use common::ClientData;
pub use error::IngestError;

use domain::ConfigMap;
use edge_runtime::{RuleHook, SourceRuntime, Worker};
use std::sync::Arc;

pub const GENERIC_MQTT: &str = "GENERIC_MQTT";
pub const HTTP: &str = "HTTP";
pub const GENERIC_TCP: &str = "GENERIC_TCP";
pub const GENERIC_UDP: &str = "GENERIC_UDP";

fn register<W, F>(runtime: &SourceRuntime, tag: &str, hook: &Arc<dyn RuleHook>, build: F)
where
    W: Worker + 'static,
    F: Fn(Arc<dyn RuleHook>) -> W + Send + Sync + 'static,
{
    let hook = hook.clone();
    runtime
        .manager()
        .register_type(tag, move |_config: &ConfigMap| {
            Ok(Box::new(build(hook.clone())) as Box<dyn Worker>)
        });
}

/// 注册全部输入源类型。
pub fn register_types(runtime: &SourceRuntime, hook: Arc<dyn RuleHook>) {
    register(runtime, GENERIC_MQTT, &hook, mqtt::MqttSource::new);
    register(runtime, HTTP, &hook, http::HttpSource::new);
    register(runtime, GENERIC_TCP, &hook, tcp::TcpSource::new);
    register(runtime, GENERIC_UDP, &hook, udp::UdpSource::new);
}
