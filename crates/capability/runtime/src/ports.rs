//! 硬件端口登记表。
//!
//! 串口、网口等物理端口同一时刻只能被一个资源占用。占用时端口标记为 `busy`，
//! 并记录占用者 `{uuid, type, name}`；释放后占用者复位为 `{-,-,-}`。

use crate::error::RuntimeError;
use domain::OrderedMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// 端口占用者。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupyBy {
    pub uuid: String,
    #[serde(rename = "type")]
    pub occupy_type: String,
    pub name: String,
}

impl OccupyBy {
    pub fn new(
        uuid: impl Into<String>,
        occupy_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            occupy_type: occupy_type.into(),
            name: name.into(),
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.uuid == "-"
    }
}

impl Default for OccupyBy {
    fn default() -> Self {
        Self::new("-", "-", "-")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwarePort {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    #[serde(default)]
    pub alias: String,
    pub busy: bool,
    pub occupy_by: OccupyBy,
}

impl HardwarePort {
    pub fn new(name: impl Into<String>, port_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            port_type: port_type.into(),
            busy: false,
            occupy_by: OccupyBy::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: OrderedMap<String, HardwarePort>,
    claims: Mutex<()>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记端口；已存在时保留原有占用状态，返回是否新登记。
    pub fn register(&self, port: HardwarePort) -> bool {
        self.ports.insert_if_absent(port.name.clone(), port)
    }

    pub fn get(&self, name: &str) -> Option<HardwarePort> {
        self.ports.get(&name.to_string())
    }

    pub fn list(&self) -> Vec<HardwarePort> {
        self.ports.values()
    }

    /// 占用端口。同一资源重复占用视为成功，被其他资源占用时拒绝。
    pub fn occupy(&self, name: &str, by: OccupyBy) -> Result<(), RuntimeError> {
        let _guard = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let key = name.to_string();
        let mut port = self
            .ports
            .get(&key)
            .ok_or_else(|| RuntimeError::PortNotFound(key.clone()))?;
        if port.busy && port.occupy_by.uuid != by.uuid {
            return Err(RuntimeError::PortBusy {
                port: key,
                uuid: port.occupy_by.uuid,
            });
        }
        info!(target: "edge.runtime", port = %name, uuid = %by.uuid, "port_occupied");
        port.busy = true;
        port.occupy_by = by;
        self.ports.set(key, port);
        Ok(())
    }

    /// 释放端口；仅当占用者是 `uuid` 时生效，返回是否释放。
    pub fn release(&self, name: &str, uuid: &str) -> bool {
        let _guard = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let key = name.to_string();
        let Some(mut port) = self.ports.get(&key) else {
            return false;
        };
        if !port.busy || port.occupy_by.uuid != uuid {
            return false;
        }
        port.busy = false;
        port.occupy_by = OccupyBy::default();
        self.ports.set(key, port);
        info!(target: "edge.runtime", port = %name, uuid = %uuid, "port_released");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_rejects_other_owner() {
        let registry = PortRegistry::new();
        assert!(registry.register(HardwarePort::new("COM1", "UART")));
        assert!(!registry.register(HardwarePort::new("COM1", "UART")));

        registry
            .occupy("COM1", OccupyBy::new("d1", "DEVICE", "meter"))
            .unwrap();
        registry
            .occupy("COM1", OccupyBy::new("d1", "DEVICE", "meter"))
            .unwrap();
        let err = registry
            .occupy("COM1", OccupyBy::new("d2", "DEVICE", "other"))
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::PortBusy {
                port: "COM1".to_string(),
                uuid: "d1".to_string()
            }
        );

        assert!(!registry.release("COM1", "d2"));
        assert!(registry.release("COM1", "d1"));
        let port = registry.get("COM1").unwrap();
        assert!(!port.busy);
        assert!(port.occupy_by.is_vacant());
        assert_eq!(port.occupy_by, OccupyBy::new("-", "-", "-"));
    }

    #[test]
    fn test_unknown_port() {
        let registry = PortRegistry::new();
        assert_eq!(
            registry.occupy("COM9", OccupyBy::default()),
            Err(RuntimeError::PortNotFound("COM9".to_string()))
        );
        assert!(!registry.release("COM9", "-"));
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = PortRegistry::new();
        registry.register(HardwarePort::new("eth0", "TCP"));
        registry.register(HardwarePort::new("COM1", "UART"));
        let names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["eth0", "COM1"]);
    }
}
