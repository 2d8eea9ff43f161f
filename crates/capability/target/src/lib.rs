//! # 北向输出目标
//!
//! 每个目标都是一个受监督的 Worker，额外实现 `Target::to`。共同约定：
//!
//! - `init` 只绑定类型化配置，不做 I/O
//! - `start` 建立连接，按需拉起心跳任务，开启 `cacheOfflineData` 时重放离线缓存
//! - `to` 写出失败且开启缓存时，数据以目标 uuid 追加到离线缓存，并返回原错误
//! - `status` 是轻量探活（TCP 拨号、MQTT 连接标志、`SELECT CLIENT_VERSION()`、PING 等）
//!
//! | 类型 | 模块 |
//! |------|------|
//! | `GENERIC_MQTT` | `mqtt` |
//! | `HTTP` | `http` |
//! | `TCP_TRANSPORT` | `tcp` |
//! | `UDP_TARGET` | `udp` |
//! | `TDENGINE` | `tdengine` |
//! | `GREPTIME_DATABASE` | `greptime` |
//! | `SEMTECH_UDP_FORWARDER` | `semtech` |
//! | `REDIS_DATABASE` | `redis` |
//! | `MONGO_SINGLE` | `mongo` |
//! | `SMTP_TARGET` | `smtp` |
//! | `SMS_TARGET` | `sms` |
//! | `RABBITMQ_TARGET` | `rabbitmq` |

mod common;
mod error;
pub mod greptime;
pub mod http;
pub mod mongo;
pub mod mqtt;
pub mod rabbitmq;
pub mod redis;
pub mod semtech;
pub mod sms;
pub mod smtp;
pub mod tcp;
pub mod tdengine;
pub mod udp;

pub use common::{DataMode, Envelope, TargetDeps};
pub use error::TargetError;

use domain::ConfigMap;
use edge_runtime::{TargetRuntime, Worker};

pub const GENERIC_MQTT: &str = "GENERIC_MQTT";
pub const HTTP: &str = "HTTP";
pub const TCP_TRANSPORT: &str = "TCP_TRANSPORT";
pub const UDP_TARGET: &str = "UDP_TARGET";
pub const TDENGINE: &str = "TDENGINE";
pub const GREPTIME_DATABASE: &str = "GREPTIME_DATABASE";
pub const SEMTECH_UDP_FORWARDER: &str = "SEMTECH_UDP_FORWARDER";
pub const REDIS_DATABASE: &str = "REDIS_DATABASE";
pub const MONGO_SINGLE: &str = "MONGO_SINGLE";
pub const SMTP_TARGET: &str = "SMTP_TARGET";
pub const SMS_TARGET: &str = "SMS_TARGET";
pub const RABBITMQ_TARGET: &str = "RABBITMQ_TARGET";

fn register<W, F>(runtime: &TargetRuntime, tag: &str, deps: &TargetDeps, build: F)
where
    W: Worker + 'static,
    F: Fn(TargetDeps) -> W + Send + Sync + 'static,
{
    let deps = deps.clone();
    runtime
        .manager()
        .register_type(tag, move |_config: &ConfigMap| {
            Ok(Box::new(build(deps.clone())) as Box<dyn Worker>)
        });
}

/// 注册全部输出目标类型。
pub fn register_types(runtime: &TargetRuntime, deps: TargetDeps) {
    register(runtime, GENERIC_MQTT, &deps, mqtt::MqttTarget::new);
    register(runtime, HTTP, &deps, http::HttpTarget::new);
    register(runtime, TCP_TRANSPORT, &deps, tcp::TcpTarget::new);
    register(runtime, UDP_TARGET, &deps, udp::UdpTarget::new);
    register(runtime, TDENGINE, &deps, tdengine::TdEngineTarget::new);
    register(runtime, GREPTIME_DATABASE, &deps, greptime::GrepTimeTarget::new);
    register(
        runtime,
        SEMTECH_UDP_FORWARDER,
        &deps,
        semtech::SemtechForwarderTarget::new,
    );
    register(runtime, REDIS_DATABASE, &deps, crate::redis::RedisTarget::new);
    register(runtime, MONGO_SINGLE, &deps, mongo::MongoTarget::new);
    register(runtime, SMTP_TARGET, &deps, smtp::SmtpTarget::new);
    register(runtime, SMS_TARGET, &deps, sms::SmsTarget::new);
    register(runtime, RABBITMQ_TARGET, &deps, rabbitmq::RabbitMqTarget::new);
}
