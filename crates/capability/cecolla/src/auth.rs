//! iThings 设备密钥认证。
//!
//! - clientId：`{productId}&{deviceName}`
//! - username：`{clientId};12010126;{connId};{expiry}`
//! - password：`hex(hmac(username, psk));{signMethod}`
//!
//! psk 按 Base64 解码后作为密钥，解码失败时直接使用原始字节。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;

const SDK_APP_ID: &str = "12010126";
const CONN_ID_LEN: usize = 5;
const CONN_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// 签名有效期（秒）
const EXPIRY_SECONDS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignMethod {
    #[default]
    #[serde(rename = "hmacsha256")]
    HmacSha256,
    #[serde(rename = "hmacsha1")]
    HmacSha1,
}

impl SignMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SignMethod::HmacSha256 => "hmacsha256",
            SignMethod::HmacSha1 => "hmacsha1",
        }
    }

    fn sign(self, data: &str, key: &[u8]) -> String {
        // HMAC 接受任意长度的密钥，new_from_slice 不会失败
        match self {
            SignMethod::HmacSha256 => match Hmac::<Sha256>::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(data.as_bytes());
                    hex::encode(mac.finalize().into_bytes())
                }
                Err(_) => String::new(),
            },
            SignMethod::HmacSha1 => match Hmac::<Sha1>::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(data.as_bytes());
                    hex::encode(mac.finalize().into_bytes())
                }
                Err(_) => String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub struct AuthInfo {
    #[serde(rename = "clientid")]
    pub client_id: String,
    pub username: String,
    pub password: String,
}

fn random_conn_id() -> String {
    let mut bytes = [0u8; CONN_ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| CONN_ID_CHARSET[*b as usize % CONN_ID_CHARSET.len()] as char)
        .collect()
}

fn psk_key(device_psk: &str) -> Vec<u8> {
    STANDARD
        .decode(device_psk)
        .unwrap_or_else(|_| device_psk.as_bytes().to_vec())
}

/// 生成连接三元组。
pub fn gen_secret_device_info(
    method: SignMethod,
    product_id: &str,
    device_name: &str,
    device_psk: &str,
) -> AuthInfo {
    let expiry = domain::now_epoch_ms() / 1000 + EXPIRY_SECONDS;
    gen_secret_device_info_with(
        method,
        product_id,
        device_name,
        device_psk,
        &random_conn_id(),
        expiry,
    )
}

pub fn gen_secret_device_info_with(
    method: SignMethod,
    product_id: &str,
    device_name: &str,
    device_psk: &str,
    conn_id: &str,
    expiry: i64,
) -> AuthInfo {
    let client_id = format!("{}&{}", product_id, device_name);
    let username = format!("{};{};{};{}", client_id, SDK_APP_ID, conn_id, expiry);
    let signature = method.sign(&username, &psk_key(device_psk));
    AuthInfo {
        client_id,
        password: format!("{};{}", signature, method.as_str()),
        username,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_triple_layout() {
        let info = gen_secret_device_info_with(
            SignMethod::HmacSha256,
            "00x",
            "gw1",
            "c2VjcmV0",
            "abcde",
            1700000000,
        );
        assert_eq!(info.client_id, "00x&gw1");
        assert_eq!(info.username, "00x&gw1;12010126;abcde;1700000000");
        let (sig, method) = info.password.split_once(';').unwrap();
        assert_eq!(method, "hmacsha256");
        assert_eq!(sig.len(), 64);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        mac.update(info.username.as_bytes());
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_sha1_and_raw_psk() {
        let info = gen_secret_device_info_with(
            SignMethod::HmacSha1,
            "p",
            "d",
            "not*base64",
            "xyz12",
            1,
        );
        let (sig, method) = info.password.split_once(';').unwrap();
        assert_eq!(method, "hmacsha1");
        let mut mac = Hmac::<Sha1>::new_from_slice(b"not*base64").unwrap();
        mac.update(info.username.as_bytes());
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_conn_id_changes() {
        let a = gen_secret_device_info(SignMethod::HmacSha256, "p", "d", "k");
        assert_eq!(a.client_id, "p&d");
        assert_eq!(a.username.split(';').nth(2).unwrap().len(), CONN_ID_LEN);
    }
}
