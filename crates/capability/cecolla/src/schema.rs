//! iThings 物模型与报文结构。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    #[default]
    Int,
    String,
    Struct,
    Float,
    Timestamp,
    Array,
    Enum,
}

impl DataType {
    /// 属性槽的初始值。
    pub fn default_value(self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Int | DataType::Float | DataType::Timestamp | DataType::Enum => {
                Value::from(0)
            }
            DataType::String => Value::String(String::new()),
            DataType::Array => Value::Array(Vec::new()),
            DataType::Struct => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefineSimple {
    #[serde(rename = "type", default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mapping: BTreeMap<String, String>,
}

/// 读写类型：`r` / `rw`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyMode {
    R,
    #[default]
    Rw,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySimple {
    #[serde(rename = "id")]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mode: PropertyMode,
    #[serde(flatten)]
    pub define: DefineSimple,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSimple {
    #[serde(rename = "id")]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub define: DefineSimple,
}

/// 事件类型：info / alert / fault。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSimple {
    #[serde(rename = "id")]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub params: Vec<ParamSimple>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionDir {
    Up,
    #[default]
    Down,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSimple {
    #[serde(rename = "id")]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dir: ActionDir,
    #[serde(default)]
    pub input: Vec<ParamSimple>,
    #[serde(default)]
    pub output: Vec<ParamSimple>,
}

/// 物模型。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSimple {
    #[serde(default)]
    pub properties: Vec<PropertySimple>,
    #[serde(default)]
    pub events: Vec<EventSimple>,
    #[serde(default)]
    pub actions: Vec<ActionSimple>,
}

/// 拓扑中的子设备。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDevice {
    #[serde(rename = "productID")]
    pub product_id: String,
    #[serde(rename = "deviceName")]
    pub device_name: String,
}

/// `$gateway/down/thing` 上的 getSchema 应答。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResponse {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub msg_token: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub payload: SchemaPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaPayload {
    #[serde(rename = "productId", alias = "productID", default)]
    pub product_id: String,
    #[serde(default)]
    pub schema: SchemaSimple,
}

/// `$gateway/down/topo` 上的拓扑应答。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyResponse {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub payload: TopologyPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyPayload {
    #[serde(default)]
    pub devices: Vec<SubDevice>,
}

/// 下行报文只关心 method。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownMessage {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub msg_token: String,
}

/// 通用应答：controlReply / actionReply / reportReply。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub method: &'static str,
    pub msg_token: String,
    pub code: i64,
    pub msg: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyReport {
    pub method: &'static str,
    pub msg_token: String,
    pub timestamp: i64,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertyReply {
    pub method: &'static str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub reply_type: Option<&'static str>,
    pub msg_token: String,
    pub timestamp: i64,
    pub code: i64,
    pub msg: &'static str,
    pub data: Map<String, Value>,
}

/// 子设备批量上报。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackReport {
    pub method: &'static str,
    pub msg_token: String,
    pub timestamp: i64,
    pub sub_devices: Vec<PackReportDevice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackReportDevice {
    #[serde(rename = "productID")]
    pub product_id: String,
    #[serde(rename = "deviceName")]
    pub device_name: String,
    pub properties: Vec<PackReportProperties>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackReportProperties {
    #[serde(skip_serializing_if = "is_zero")]
    pub timestamp: i64,
    pub params: Map<String, Value>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// 新建物模型属性。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSchemaProperty {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: DataType,
    #[serde(rename = "productID", default, skip_serializing_if = "String::is_empty")]
    pub product_id: String,
    #[serde(rename = "deviceName", default, skip_serializing_if = "String::is_empty")]
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchema {
    pub method: &'static str,
    pub msg_token: String,
    pub timestamp: i64,
    pub properties: Vec<CreateSchemaProperty>,
}

/// `GetProperties` / `GetPropertyReplySuccess` 的参数。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetPropertiesArgs {
    #[serde(default)]
    pub token: String,
    #[serde(rename = "productID")]
    pub product_id: String,
    #[serde(rename = "deviceName")]
    pub device_name: String,
    #[serde(default)]
    pub identifiers: Vec<String>,
}

/// `SubDeviceSetOnline` / `PackReportSubDeviceParams` 的参数。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubDeviceParam {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "productID")]
    pub product_id: String,
    #[serde(rename = "deviceName", alias = "deviceID")]
    pub device_name: String,
    #[serde(default)]
    pub param: String,
    #[serde(default)]
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_from_platform_json() {
        let raw = json!({
            "properties": [
                {"id": "temp", "name": "温度", "mode": "r", "type": "float"},
                {"id": "sw", "name": "开关", "mode": "rw", "type": "bool", "mapping": {"0": "关", "1": "开"}}
            ],
            "events": [{"id": "over", "name": "超温", "type": "alert", "params": []}],
            "actions": [{"id": "reboot", "name": "重启", "dir": "down", "input": [], "output": []}]
        });
        let schema: SchemaSimple = serde_json::from_value(raw).unwrap();
        assert_eq!(schema.properties.len(), 2);
        assert_eq!(schema.properties[0].define.data_type, DataType::Float);
        assert_eq!(schema.properties[0].mode, PropertyMode::R);
        assert_eq!(schema.properties[1].define.mapping.get("1").unwrap(), "开");
        assert_eq!(schema.events[0].event_type, "alert");
        assert_eq!(schema.actions[0].dir, ActionDir::Down);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(DataType::Bool.default_value(), json!(false));
        assert_eq!(DataType::Int.default_value(), json!(0));
        assert_eq!(DataType::String.default_value(), json!(""));
        assert_eq!(DataType::Struct.default_value(), Value::Null);
    }

    #[test]
    fn test_pack_report_shape() {
        let mut params = Map::new();
        params.insert("temp".to_string(), json!(1));
        let report = PackReport {
            method: "packReport",
            msg_token: "t".to_string(),
            timestamp: 5,
            sub_devices: vec![PackReportDevice {
                product_id: "p".to_string(),
                device_name: "d".to_string(),
                properties: vec![PackReportProperties {
                    timestamp: 0,
                    params,
                }],
            }],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["subDevices"][0]["productID"], "p");
        assert!(value["subDevices"][0]["properties"][0].get("timestamp").is_none());
    }
}
