//! # 资源运行时
//!
//! 输入源、设备、输出目标与云边协同共用的监督框架。
//!
//! ```text
//! register_type(tag, factory)
//!        │
//! load ──┴─> factory(config) ─> init ─> 资源表（PENDING）
//!                                          │
//!                      supervise_once ─────┤ 未启动 → start
//!                      （每 5 秒）          │ DOWN   → stop + start（新取消令牌）
//!                                          │ STOP / DISABLE → 移除
//! ```
//!
//! Worker 能力按需组合：所有 Worker 实现 `Worker`，输出目标额外实现 `Target`，
//! 设备与云边协同额外实现 `Controllable`。
//!
//! 物理端口由 `PortRegistry` 登记，四类运行时共享同一张表。

mod bind;
mod cancel;
mod error;
mod hook;
mod intercache;
mod manager;
mod ports;
mod runtime;
mod worker;

pub use bind::{ValidateConfig, bind_config, config_to_map, require_non_empty};
pub use cancel::CancelToken;
pub use error::RuntimeError;
pub use hook::{ChannelRuleHook, NoopRuleHook, RuleEvent, RuleEventKind, RuleHook};
pub use intercache::{CECOLLA_SLOT, CacheValue, DEVICE_SLOT, InterCache, SOURCE_SLOT};
pub use manager::{ResourceManager, UuidRegistry, WorkerFactory};
pub use ports::{HardwarePort, OccupyBy, PortRegistry};
pub use runtime::{
    CecollaRuntime, DeviceRuntime, ResourceRuntime, Runtimes, SourceRuntime, TargetRuntime,
};
pub use worker::{Controllable, StateCell, Target, Worker, WorkerTasks};

/// 默认监督周期（秒）。
pub const DEFAULT_SUPERVISOR_INTERVAL_SECS: u64 = 5;
