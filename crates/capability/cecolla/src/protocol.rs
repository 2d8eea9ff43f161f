//! 网关协议核心：连接后的订阅流程、下行分发与 OnCtrl 指令表。
//!
//! 与 MQTT 客户端解耦，所有上行都经过 [`Uplink`]。属性槽保存在以 Worker uuid
//! 命名的 inter-cache 槽中，key 为 `{productId}:{deviceName}:{identifier}`。

use crate::config::{GatewayMode, IThingsConfig};
use crate::error::CecollaError;
use crate::schema::{
    CreateSchema, CreateSchemaProperty, DownMessage, GetPropertiesArgs, GetPropertyReply,
    PackReport, PackReportDevice, PackReportProperties, PropertyReport, ReplyEnvelope,
    SchemaResponse, SchemaSimple, SubDevice, SubDeviceParam, TopologyResponse,
};
use crate::topics::{self, Topics};
use crate::uplink::Uplink;
use domain::now_epoch_ms;
use edge_runtime::{CacheValue, InterCache, RuleHook};
use edge_telemetry::record_downlink_message;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn property_key(product_id: &str, device_name: &str, identifier: &str) -> String {
    format!("{}:{}:{}", product_id, device_name, identifier)
}

fn parse_args<T: serde::de::DeserializeOwned>(args: &[u8]) -> Result<T, CecollaError> {
    serde_json::from_slice(args).map_err(|e| CecollaError::InvalidArgs(e.to_string()))
}

#[derive(Debug, Default)]
struct Schemas {
    gateway: Option<SchemaSimple>,
    sub_device: Option<SchemaSimple>,
}

pub struct GatewayCore {
    uuid: String,
    config: IThingsConfig,
    topics: Topics,
    uplink: Arc<dyn Uplink>,
    hook: Arc<dyn RuleHook>,
    intercache: Arc<InterCache>,
    schemas: Mutex<Schemas>,
    topology: Mutex<Vec<SubDevice>>,
}

impl GatewayCore {
    pub fn new(
        uuid: &str,
        config: IThingsConfig,
        uplink: Arc<dyn Uplink>,
        hook: Arc<dyn RuleHook>,
        intercache: Arc<InterCache>,
    ) -> Self {
        intercache.register_slot(uuid);
        Self {
            uuid: uuid.to_string(),
            topics: Topics::new(&config.product_id, &config.device_name),
            config,
            uplink,
            hook,
            intercache,
            schemas: Mutex::new(Schemas::default()),
            topology: Mutex::new(Vec::new()),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn is_connected(&self) -> bool {
        self.uplink.is_connected()
    }

    /// 释放属性槽。
    pub fn teardown(&self) {
        self.intercache.unregister_slot(&self.uuid);
    }

    fn get_schema_request(product_id: &str) -> Value {
        json!({
            "method": "getSchema",
            "msgToken": new_token(),
            "payload": {"productID": product_id},
        })
    }

    /// 连接建立后的订阅与查询。
    pub async fn on_connected(&self) -> Result<(), CecollaError> {
        self.uplink.subscribe(&self.topics.property_down).await?;
        self.uplink.subscribe(&self.topics.action_down).await?;
        self.publish_json(
            &self.topics.gateway_up,
            &Self::get_schema_request(&self.config.product_id),
        )
        .await?;
        if self.config.mode == GatewayMode::Gateway {
            info!(target: "edge.cecolla", uuid = %self.uuid, "ithings_gateway_mode");
            self.uplink.subscribe(&self.topics.gateway_down).await?;
            self.publish_json(
                &self.topics.gateway_up,
                &Self::get_schema_request(&self.config.sub_product),
            )
            .await?;
            self.uplink.subscribe(&self.topics.topology_down).await?;
            self.publish_json(
                &self.topics.topology_up,
                &json!({"method": "getTopo", "msgToken": new_token()}),
            )
            .await?;
        }
        Ok(())
    }

    /// 分发一条下行消息。
    pub async fn handle_downlink(&self, topic: &str, payload: &[u8]) {
        record_downlink_message();
        if topic == self.topics.property_down || topic == self.topics.action_down {
            self.forward_downlink(topic, payload).await;
        } else if topic == self.topics.gateway_down {
            match serde_json::from_slice::<SchemaResponse>(payload) {
                Ok(response) => self.install_schema(&response.payload.product_id, response.payload.schema),
                Err(err) => {
                    warn!(target: "edge.cecolla", uuid = %self.uuid, error = %err, "ithings_schema_decode_failed");
                }
            }
        } else if topic == self.topics.topology_down {
            match serde_json::from_slice::<TopologyResponse>(payload) {
                Ok(response) => self.install_topology(response.payload.devices),
                Err(err) => {
                    warn!(target: "edge.cecolla", uuid = %self.uuid, error = %err, "ithings_topology_decode_failed");
                }
            }
        } else {
            debug!(
                target: "edge.cecolla",
                uuid = %self.uuid,
                topic = %topic,
                payload = %String::from_utf8_lossy(payload),
                "ithings_downlink_ignored"
            );
        }
    }

    /// 原始载荷总是交给规则钩子，解析结果只用于日志。
    async fn forward_downlink(&self, topic: &str, payload: &[u8]) {
        match serde_json::from_slice::<DownMessage>(payload) {
            Ok(message) => debug!(
                target: "edge.cecolla",
                uuid = %self.uuid,
                topic = %topic,
                method = %message.method,
                msg_token = %message.msg_token,
                "ithings_downlink"
            ),
            Err(err) => debug!(
                target: "edge.cecolla",
                uuid = %self.uuid,
                topic = %topic,
                error = %err,
                "ithings_downlink_unparsed"
            ),
        }
        let (product, device) = topics::split_thing_topic(topic).unwrap_or_default();
        let env = json!({
            "product": product,
            "device": device,
            "topic": topic,
            "payload": String::from_utf8_lossy(payload),
        });
        if let Err(err) = self.hook.work_cecolla(&self.uuid, &env.to_string()).await {
            warn!(target: "edge.cecolla", uuid = %self.uuid, error = %err, "ithings_rule_hook_failed");
        }
    }

    /// 安装物模型，按产品区分网关自身与子设备。
    pub fn install_schema(&self, product_id: &str, schema: SchemaSimple) {
        if product_id == self.config.product_id {
            self.seed_defaults(&self.config.product_id, &self.config.device_name, &schema);
            self.schemas.lock().unwrap_or_else(|e| e.into_inner()).gateway = Some(schema);
            info!(target: "edge.cecolla", uuid = %self.uuid, product_id = %product_id, "ithings_gateway_schema_loaded");
        } else if !self.config.sub_product.is_empty() && product_id == self.config.sub_product {
            for device in self.sub_devices() {
                self.seed_defaults(&device.product_id, &device.device_name, &schema);
            }
            self.schemas.lock().unwrap_or_else(|e| e.into_inner()).sub_device = Some(schema);
            info!(target: "edge.cecolla", uuid = %self.uuid, product_id = %product_id, "ithings_sub_device_schema_loaded");
        } else {
            debug!(target: "edge.cecolla", uuid = %self.uuid, product_id = %product_id, "ithings_schema_ignored");
        }
    }

    fn install_topology(&self, devices: Vec<SubDevice>) {
        let count = devices.len();
        *self.topology.lock().unwrap_or_else(|e| e.into_inner()) = devices;
        let sub_schema = self
            .schemas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sub_device
            .clone();
        if let Some(schema) = sub_schema {
            for device in self.sub_devices() {
                self.seed_defaults(&device.product_id, &device.device_name, &schema);
            }
        }
        info!(target: "edge.cecolla", uuid = %self.uuid, devices = count, "ithings_topology_loaded");
    }

    fn sub_devices(&self) -> Vec<SubDevice> {
        self.topology
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|d| d.product_id == self.config.sub_product)
            .cloned()
            .collect()
    }

    pub fn gateway_schema(&self) -> Option<SchemaSimple> {
        self.schemas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gateway
            .clone()
    }

    /// 按物模型初始化属性槽，已有值保留。
    fn seed_defaults(&self, product_id: &str, device_name: &str, schema: &SchemaSimple) {
        for property in &schema.properties {
            let key = property_key(product_id, device_name, &property.identifier);
            if self.intercache.get(&self.uuid, &key).is_none() {
                let value = property.define.data_type.default_value();
                if let Err(err) = self.set_property(&key, value) {
                    warn!(target: "edge.cecolla", uuid = %self.uuid, key = %key, error = %err, "ithings_property_seed_failed");
                }
            }
        }
    }

    fn set_property(&self, key: &str, value: Value) -> Result<(), CecollaError> {
        self.intercache
            .set(&self.uuid, key, CacheValue::new(self.uuid.clone(), value))?;
        Ok(())
    }

    pub fn property(&self, product_id: &str, device_name: &str, identifier: &str) -> Value {
        self.intercache
            .get(&self.uuid, &property_key(product_id, device_name, identifier))
            .map(|v| v.value)
            .unwrap_or(Value::Null)
    }

    fn collect_properties(&self, args: &GetPropertiesArgs) -> Map<String, Value> {
        args.identifiers
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    self.property(&args.product_id, &args.device_name, id),
                )
            })
            .collect()
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, body: &T) -> Result<Vec<u8>, CecollaError> {
        let payload = serde_json::to_vec(body)?;
        self.uplink.publish(topic, payload.clone()).await?;
        debug!(
            target: "edge.cecolla",
            uuid = %self.uuid,
            topic = %topic,
            payload = %String::from_utf8_lossy(&payload),
            "ithings_uplink"
        );
        Ok(payload)
    }

    async fn reply(&self, topic: &str, method: &'static str, success: bool) -> Result<Vec<u8>, CecollaError> {
        let envelope = ReplyEnvelope {
            method,
            msg_token: new_token(),
            code: if success { 200 } else { 500 },
            msg: if success { "success" } else { "failure" },
        };
        self.publish_json(topic, &envelope).await
    }

    /// 执行一条控制指令，返回查询结果或已发布的报文。
    pub async fn on_ctrl(&self, cmd: &str, args: &[u8]) -> Result<Vec<u8>, CecollaError> {
        let topics = &self.topics;
        match cmd {
            "GetSchema" => {
                let schemas = {
                    let guard = self.schemas.lock().unwrap_or_else(|e| e.into_inner());
                    json!({
                        "gatewaySchema": guard.gateway,
                        "subDeviceSchema": guard.sub_device,
                    })
                };
                Ok(serde_json::to_vec(&schemas)?)
            }
            "GetTopology" => {
                let devices = self.topology.lock().unwrap_or_else(|e| e.into_inner()).clone();
                Ok(serde_json::to_vec(&devices)?)
            }
            "GetProperties" => {
                let args: GetPropertiesArgs = parse_args(args)?;
                Ok(serde_json::to_vec(&self.collect_properties(&args))?)
            }
            "CtrlReplySuccess" => self.reply(&topics.property_up, "controlReply", true).await,
            "CtrlReplyFailure" => self.reply(&topics.property_up, "controlReply", false).await,
            "ActionReplySuccess" => self.reply(&topics.action_up, "actionReply", true).await,
            "ActionReplyFailure" => self.reply(&topics.action_up, "actionReply", false).await,
            "PropertyReplySuccess" => self.reply(&topics.property_up, "reportReply", true).await,
            "PropertyReplyFailure" => self.reply(&topics.property_up, "reportReply", false).await,
            "PropertyReport" => {
                let params: Map<String, Value> = parse_args(args)?;
                let report = PropertyReport {
                    method: "report",
                    msg_token: new_token(),
                    timestamp: now_epoch_ms(),
                    params,
                };
                self.publish_json(&topics.property_up, &report).await
            }
            "GetPropertyReply" => {
                let data: Map<String, Value> = parse_args(args)?;
                let reply = GetPropertyReply {
                    method: "getReportReply",
                    reply_type: Some("report"),
                    msg_token: new_token(),
                    timestamp: now_epoch_ms(),
                    code: 0,
                    msg: "success",
                    data,
                };
                self.publish_json(&topics.property_up, &reply).await
            }
            "GetPropertyReplySuccess" => {
                let args: GetPropertiesArgs = parse_args(args)?;
                let reply = GetPropertyReply {
                    method: "getReportReply",
                    reply_type: None,
                    msg_token: new_token(),
                    timestamp: now_epoch_ms(),
                    code: 200,
                    msg: "success",
                    data: self.collect_properties(&args),
                };
                let topic = topics::property_up(&args.product_id, &args.device_name);
                self.publish_json(&topic, &reply).await
            }
            "SubDeviceSetOnline" => {
                let param: SubDeviceParam = parse_args(args)?;
                let body = json!({
                    "method": "online",
                    "msgToken": new_token(),
                    "payload": {
                        "devices": [{
                            "productID": param.product_id,
                            "deviceName": param.device_name,
                        }]
                    }
                });
                self.publish_json(&topics.status_up, &body).await
            }
            "PackReportSubDeviceParams" => {
                let param: SubDeviceParam = parse_args(args)?;
                if param.param.is_empty() {
                    return Err(CecollaError::InvalidArgs("param is required".to_string()));
                }
                let key = property_key(&param.product_id, &param.device_name, &param.param);
                self.set_property(&key, param.value.clone())?;
                let mut params = Map::new();
                params.insert(param.param, param.value);
                let report = PackReport {
                    method: "packReport",
                    msg_token: new_token(),
                    timestamp: now_epoch_ms(),
                    sub_devices: vec![PackReportDevice {
                        product_id: param.product_id,
                        device_name: param.device_name,
                        properties: vec![PackReportProperties {
                            timestamp: param.timestamp,
                            params,
                        }],
                    }],
                };
                self.publish_json(&topics.property_up, &report).await
            }
            "CreateSubDeviceSchema" => {
                let properties: Vec<CreateSchemaProperty> = parse_args(args)?;
                for property in &properties {
                    let body = CreateSchema {
                        method: "createSchema",
                        msg_token: new_token(),
                        timestamp: now_epoch_ms(),
                        properties: vec![CreateSchemaProperty {
                            product_id: String::new(),
                            device_name: String::new(),
                            ..property.clone()
                        }],
                    };
                    let topic = topics::gateway_up(&property.product_id, &property.device_name);
                    self.publish_json(&topic, &body).await?;
                    let key = property_key(&property.product_id, &property.device_name, &property.id);
                    self.set_property(&key, property.data_type.default_value())?;
                }
                self.publish_json(
                    &topics.gateway_up,
                    &Self::get_schema_request(&self.config.sub_product),
                )
                .await?;
                Ok(serde_json::to_vec(&json!({"created": properties.len()}))?)
            }
            other => Err(CecollaError::UnsupportedCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SignMethod;
    use async_trait::async_trait;
    use edge_runtime::{ChannelRuleHook, NoopRuleHook, RuleEventKind};

    #[derive(Default)]
    struct Recorder {
        subscribed: Mutex<Vec<String>>,
        published: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Uplink for Recorder {
        async fn subscribe(&self, topic: &str) -> Result<(), CecollaError> {
            self.subscribed.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), CecollaError> {
            let value = serde_json::from_slice(&payload).unwrap();
            self.published.lock().unwrap().push((topic.to_string(), value));
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn config(mode: GatewayMode) -> IThingsConfig {
        IThingsConfig {
            server_endpoint: "tcp://127.0.0.1:1883".to_string(),
            mode,
            sub_product: "sp".to_string(),
            product_id: "p1".to_string(),
            device_name: "gw".to_string(),
            device_psk: "k".to_string(),
            sign_method: SignMethod::HmacSha256,
            schema_api_host: String::new(),
        }
    }

    fn core(mode: GatewayMode) -> (GatewayCore, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let core = GatewayCore::new(
            "c1",
            config(mode),
            recorder.clone(),
            Arc::new(NoopRuleHook),
            Arc::new(InterCache::new()),
        );
        (core, recorder)
    }

    #[tokio::test]
    async fn test_device_mode_on_connect() {
        let (core, recorder) = core(GatewayMode::Device);
        core.on_connected().await.unwrap();
        assert_eq!(
            *recorder.subscribed.lock().unwrap(),
            vec!["$thing/down/property/p1/gw", "$thing/down/action/p1/gw"]
        );
        let published = recorder.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "$gateway/up/thing/p1/gw");
        assert_eq!(published[0].1["method"], "getSchema");
        assert_eq!(published[0].1["payload"]["productID"], "p1");
    }

    #[tokio::test]
    async fn test_gateway_mode_on_connect() {
        let (core, recorder) = core(GatewayMode::Gateway);
        core.on_connected().await.unwrap();
        assert_eq!(recorder.subscribed.lock().unwrap().len(), 4);
        let published = recorder.published.lock().unwrap();
        let methods: Vec<&str> = published
            .iter()
            .map(|(_, v)| v["method"].as_str().unwrap())
            .collect();
        assert_eq!(methods, vec!["getSchema", "getSchema", "getTopo"]);
        assert_eq!(published[1].1["payload"]["productID"], "sp");
        assert_eq!(published[2].0, "$gateway/up/topo/p1/gw");
    }

    #[tokio::test]
    async fn test_schema_and_topology_seed_properties() {
        let (core, _recorder) = core(GatewayMode::Gateway);
        let topology = json!({"method": "getTopoReply", "code": 200, "payload": {
            "devices": [{"productID": "sp", "deviceName": "s1"}]
        }});
        core.handle_downlink("$gateway/down/topo/p1/gw", topology.to_string().as_bytes())
            .await;
        let schema = json!({"method": "getSchemaReply", "code": 200, "payload": {
            "productId": "sp",
            "schema": {"properties": [{"id": "on", "name": "on", "type": "bool"}]}
        }});
        core.handle_downlink("$gateway/down/thing/p1/gw", schema.to_string().as_bytes())
            .await;
        let own = json!({"payload": {
            "productId": "p1",
            "schema": {"properties": [{"id": "temp", "type": "float"}]}
        }});
        core.handle_downlink("$gateway/down/thing/p1/gw", own.to_string().as_bytes())
            .await;

        assert_eq!(core.property("sp", "s1", "on"), json!(false));
        assert_eq!(core.property("p1", "gw", "temp"), json!(0));
        assert!(core.gateway_schema().is_some());

        let reply = core.on_ctrl("GetTopology", b"").await.unwrap();
        let devices: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(devices[0]["deviceName"], "s1");
    }

    #[tokio::test]
    async fn test_downlink_forwarded_to_rule_hook() {
        let (hook, mut rx) = ChannelRuleHook::new(4);
        let recorder = Arc::new(Recorder::default());
        let core = GatewayCore::new(
            "c1",
            config(GatewayMode::Device),
            recorder,
            Arc::new(hook),
            Arc::new(InterCache::new()),
        );
        let payload = br#"{"method":"control","msgToken":"m1","params":{"sw":1}}"#;
        core.handle_downlink("$thing/down/property/p1/gw", payload).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, RuleEventKind::Cecolla);
        let env: Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(env["product"], "p1");
        assert_eq!(env["device"], "gw");
        assert_eq!(env["topic"], "$thing/down/property/p1/gw");
        assert!(env["payload"].as_str().unwrap().contains("control"));
    }

    #[tokio::test]
    async fn test_non_json_downlink_still_forwarded() {
        let (hook, mut rx) = ChannelRuleHook::new(4);
        let core = GatewayCore::new(
            "c1",
            config(GatewayMode::Device),
            Arc::new(Recorder::default()),
            Arc::new(hook),
            Arc::new(InterCache::new()),
        );
        core.handle_downlink("$thing/down/action/p1/gw", b"reboot now").await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, RuleEventKind::Cecolla);
        let env: Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(env["topic"], "$thing/down/action/p1/gw");
        assert_eq!(env["payload"], "reboot now");
    }

    #[tokio::test]
    async fn test_replies_mint_fresh_tokens() {
        let (core, recorder) = core(GatewayMode::Device);
        core.on_ctrl("CtrlReplySuccess", b"old").await.unwrap();
        core.on_ctrl("ActionReplyFailure", b"old").await.unwrap();
        core.on_ctrl("PropertyReplySuccess", b"").await.unwrap();
        let published = recorder.published.lock().unwrap();
        assert_eq!(published[0].0, "$thing/up/property/p1/gw");
        assert_eq!(published[0].1["method"], "controlReply");
        assert_eq!(published[0].1["code"], 200);
        assert_eq!(published[1].0, "$thing/up/action/p1/gw");
        assert_eq!(published[1].1["method"], "actionReply");
        assert_eq!(published[1].1["code"], 500);
        assert_eq!(published[2].1["method"], "reportReply");
        let tokens: Vec<&str> = published
            .iter()
            .map(|(_, v)| v["msgToken"].as_str().unwrap())
            .collect();
        assert!(tokens.iter().all(|t| *t != "old"));
        assert_ne!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn test_get_property_reply() {
        let (core, recorder) = core(GatewayMode::Device);
        core.on_ctrl("GetPropertyReply", br#"{"temp":1}"#).await.unwrap();
        let published = recorder.published.lock().unwrap();
        let body = &published[0].1;
        assert_eq!(body["method"], "getReportReply");
        assert_eq!(body["type"], "report");
        assert_eq!(body["code"], 0);
        assert_eq!(body["msg"], "success");
        assert_eq!(body["data"]["temp"], 1);
    }

    #[tokio::test]
    async fn test_pack_report_updates_slot() {
        let (core, recorder) = core(GatewayMode::Gateway);
        let args = json!({"timestamp": 10, "productID": "sp", "deviceName": "s1", "param": "on", "value": true});
        core.on_ctrl("PackReportSubDeviceParams", args.to_string().as_bytes())
            .await
            .unwrap();
        {
            let published = recorder.published.lock().unwrap();
            assert_eq!(published[0].0, "$thing/up/property/p1/gw");
            assert_eq!(published[0].1["method"], "packReport");
            assert_eq!(published[0].1["subDevices"][0]["properties"][0]["params"]["on"], true);
        }

        let query = json!({"productID": "sp", "deviceName": "s1", "identifiers": ["on", "missing"]});
        let values: Value = serde_json::from_slice(
            &core.on_ctrl("GetProperties", query.to_string().as_bytes()).await.unwrap(),
        )
        .unwrap();
        assert_eq!(values, json!({"on": true, "missing": null}));

        core.on_ctrl("GetPropertyReplySuccess", query.to_string().as_bytes())
            .await
            .unwrap();
        let published = recorder.published.lock().unwrap();
        assert_eq!(published[1].0, "$thing/up/property/sp/s1");
        assert_eq!(published[1].1["code"], 200);
        assert_eq!(published[1].1["data"]["on"], true);
    }

    #[tokio::test]
    async fn test_sub_device_online_and_create_schema() {
        let (core, recorder) = core(GatewayMode::Gateway);
        core.on_ctrl(
            "SubDeviceSetOnline",
            br#"{"productID":"sp","deviceName":"s1"}"#,
        )
        .await
        .unwrap();
        let props = json!([{"id": "level", "name": "液位", "type": "int", "productID": "sp", "deviceName": "s1"}]);
        core.on_ctrl("CreateSubDeviceSchema", props.to_string().as_bytes())
            .await
            .unwrap();
        let published = recorder.published.lock().unwrap();
        assert_eq!(published[0].0, "$gateway/up/status/p1/gw");
        assert_eq!(published[0].1["payload"]["devices"][0]["deviceName"], "s1");
        assert_eq!(published[1].0, "$gateway/up/thing/sp/s1");
        assert_eq!(published[1].1["method"], "createSchema");
        assert!(published[1].1["properties"][0].get("productID").is_none());
        assert_eq!(published[2].1["method"], "getSchema");
        drop(published);
        assert_eq!(core.property("sp", "s1", "level"), json!(0));
    }

    #[tokio::test]
    async fn test_unknown_command_and_bad_args() {
        let (core, _recorder) = core(GatewayMode::Device);
        assert!(matches!(
            core.on_ctrl("Reboot", b"").await,
            Err(CecollaError::UnsupportedCommand(cmd)) if cmd == "Reboot"
        ));
        assert!(matches!(
            core.on_ctrl("PropertyReport", b"not json").await,
            Err(CecollaError::InvalidArgs(_))
        ));
    }

    #[tokio::test]
    async fn test_teardown_releases_slot() {
        let intercache = Arc::new(InterCache::new());
        let core = GatewayCore::new(
            "c9",
            config(GatewayMode::Device),
            Arc::new(Recorder::default()),
            Arc::new(NoopRuleHook),
            intercache.clone(),
        );
        assert!(intercache.get_slot("c9").is_some());
        core.teardown();
        assert!(intercache.get_slot("c9").is_none());
    }
}
