//! iThings 主题模板。

pub fn property_up(product_id: &str, device_name: &str) -> String {
    format!("$thing/up/property/{}/{}", product_id, device_name)
}

pub fn gateway_up(product_id: &str, device_name: &str) -> String {
    format!("$gateway/up/thing/{}/{}", product_id, device_name)
}

/// 单台设备的全部主题。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub property_up: String,
    pub property_down: String,
    pub action_up: String,
    pub action_down: String,
    pub gateway_up: String,
    pub gateway_down: String,
    pub topology_up: String,
    pub topology_down: String,
    pub status_up: String,
    pub status_down: String,
}

impl Topics {
    pub fn new(product_id: &str, device_name: &str) -> Self {
        let pair = format!("{}/{}", product_id, device_name);
        Self {
            property_up: property_up(product_id, device_name),
            property_down: format!("$thing/down/property/{}", pair),
            action_up: format!("$thing/up/action/{}", pair),
            action_down: format!("$thing/down/action/{}", pair),
            gateway_up: gateway_up(product_id, device_name),
            gateway_down: format!("$gateway/down/thing/{}", pair),
            topology_up: format!("$gateway/up/topo/{}", pair),
            topology_down: format!("$gateway/down/topo/{}", pair),
            status_up: format!("$gateway/up/status/{}", pair),
            status_down: format!("$gateway/down/status/{}", pair),
        }
    }
}

/// 从 `$thing/down/{kind}/{pid}/{dev}` 中取出产品与设备。
pub fn split_thing_topic(topic: &str) -> Option<(&str, &str)> {
    let fields: Vec<&str> = topic.split('/').collect();
    if fields.len() == 5 {
        Some((fields[3], fields[4]))
    } else {
        None
    }
}
