//! # 南向设备
//!
//! 设备 Worker 采集现场数据并经 `RuleHook::work_device` 上送，同时实现
//! `Controllable` 接受同步控制指令。运行中的读数写入以设备 uuid 命名的
//! InterCache 槽，停止时注销。
//!
//! | 类型 | 模块 | OnCtrl |
//! |------|------|--------|
//! | `GENERIC_MODBUS_MASTER` | `modbus` | `WriteSingleRegister`、`WriteMultipleRegisters` |
//! | `GENERIC_USER_PROTOCOL` | `user_protocol` | `Request` |

mod common;
mod error;
pub mod modbus;
pub mod user_protocol;

pub use error::DeviceError;

use domain::ConfigMap;
use edge_runtime::{DeviceRuntime, InterCache, PortRegistry, RuleHook, Worker};
use std::sync::Arc;

pub const GENERIC_MODBUS_MASTER: &str = "GENERIC_MODBUS_MASTER";
pub const GENERIC_USER_PROTOCOL: &str = "GENERIC_USER_PROTOCOL";

fn register<W, F>(
    runtime: &DeviceRuntime,
    tag: &str,
    hook: &Arc<dyn RuleHook>,
    build: F,
) where
    W: Worker + 'static,
    F: Fn(Arc<dyn RuleHook>, Arc<InterCache>, Arc<PortRegistry>) -> W + Send + Sync + 'static,
{
    let hook = hook.clone();
    let intercache = runtime.intercache().clone();
    let ports = runtime.ports().clone();
    runtime
        .manager()
        .register_type(tag, move |_config: &ConfigMap| {
            let worker = build(hook.clone(), intercache.clone(), ports.clone());
            Ok(Box::new(worker) as Box<dyn Worker>)
        });
}

/// 注册全部设备类型。
pub fn register_types(runtime: &DeviceRuntime, hook: Arc<dyn RuleHook>) {
    register(
        runtime,
        GENERIC_MODBUS_MASTER,
        &hook,
        |hook, intercache, _ports| modbus::ModbusMasterDevice::new(hook, intercache),
    );
    register(
        runtime,
        GENERIC_USER_PROTOCOL,
        &hook,
        user_protocol::UserProtocolDevice::new,
    );
}
