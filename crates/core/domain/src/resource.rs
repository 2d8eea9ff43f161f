use crate::ResourceState;
use serde::{Deserialize, Serialize};

/// 资源的非类型化配置（key → value）。
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// 资源类别，按数据流方向区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// 输入源（InEnd）
    Source,
    /// 设备
    Device,
    /// 输出目标（OutEnd）
    Target,
    /// 云边协同
    Cecolla,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Source => "source",
            ResourceKind::Device => "device",
            ResourceKind::Target => "target",
            ResourceKind::Cecolla => "cecolla",
        }
    }

    /// 解析复数形式或单数形式（API 路径使用复数）。
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "source" | "sources" | "inend" => Some(ResourceKind::Source),
            "device" | "devices" => Some(ResourceKind::Device),
            "target" | "targets" | "outend" => Some(ResourceKind::Target),
            "cecolla" | "cecollas" => Some(ResourceKind::Cecolla),
            _ => None,
        }
    }
}

/// 受监督的资源单元。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_state")]
    pub state: ResourceState,
}

fn default_state() -> ResourceState {
    ResourceState::Pending
}

impl Resource {
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        type_tag: impl Into<String>,
        config: ConfigMap,
        description: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            type_tag: type_tag.into(),
            config,
            description: description.into(),
            state: ResourceState::Pending,
        }
    }
}
