//! # 云边协同
//!
//! iThings 物联网平台 MQTT 网关，类型 `ITHINGS_IOTHUB`，模式 `DEVICE` / `GATEWAY`。
//!
//! | 方向 | 主题 |
//! |------|------|
//! | 属性上行 / 下行 | `$thing/{up,down}/property/{pid}/{dev}` |
//! | 行为上行 / 下行 | `$thing/{up,down}/action/{pid}/{dev}` |
//! | 网关物模型 | `$gateway/{up,down}/thing/{pid}/{dev}` |
//! | 拓扑 | `$gateway/{up,down}/topo/{pid}/{dev}` |
//! | 子设备上下线 | `$gateway/{up,down}/status/{pid}/{dev}` |
//!
//! 下行的属性与行为消息以 `{"product","device","topic","payload"}` 交给规则引擎；
//! 上行由规则通过 `OnCtrl` 触发，指令表见 [`GatewayCore::on_ctrl`]。

pub mod auth;
pub mod config;
mod protocol;
mod error;
pub mod gateway;
pub mod httpapi;
pub mod schema;
pub mod topics;
mod uplink;

pub use protocol::GatewayCore;
pub use config::{GatewayMode, IThingsConfig};
pub use error::CecollaError;
pub use gateway::IThingsGateway;
pub use uplink::{MqttUplink, Uplink};

use domain::ConfigMap;
use edge_runtime::{CecollaRuntime, RuleHook, Worker};
use std::sync::Arc;

pub const ITHINGS_IOTHUB: &str = "ITHINGS_IOTHUB";

/// 注册云边协同类型。
pub fn register_types(runtime: &CecollaRuntime, hook: Arc<dyn RuleHook>) {
    let intercache = runtime.intercache().clone();
    runtime
        .manager()
        .register_type(ITHINGS_IOTHUB, move |_config: &ConfigMap| {
            Ok(Box::new(IThingsGateway::new(hook.clone(), intercache.clone())) as Box<dyn Worker>)
        });
}
