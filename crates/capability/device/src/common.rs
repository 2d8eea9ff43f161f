use crate::error::DeviceError;
use edge_runtime::RuleHook;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// 解析 OnCtrl 参数（JSON）。
pub(crate) fn parse_args<T: DeserializeOwned>(args: &[u8]) -> Result<T, DeviceError> {
    Ok(serde_json::from_slice(args)?)
}

/// 把设备数据交给规则引擎，失败只记日志。
pub(crate) async fn emit_json<T: Serialize + ?Sized>(hook: &dyn RuleHook, uuid: &str, value: &T) {
    let data = match serde_json::to_string(value) {
        Ok(data) => data,
        Err(err) => {
            warn!(target: "edge.device", uuid = %uuid, error = %err, "device_encode_failed");
            return;
        }
    };
    if let Err(err) = hook.work_device(uuid, &data).await {
        warn!(target: "edge.device", uuid = %uuid, error = %err, "device_dispatch_failed");
    }
}
