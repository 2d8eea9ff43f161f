//! 二进制字段解析
//!
//! 表达式形如 `"ID:32:int:BE; Name:40:string:BE; Temp:32:float:LE"`，
//! 每段为 `Key:LengthBits:Type:Endian`，位长按字节向上对齐。

use crate::error::ProtocolError;
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Big,
    Little,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
    key: String,
    bits: usize,
    kind: String,
    endian: Endian,
}

fn parse_field(field: &str) -> Result<FieldSpec, ProtocolError> {
    let parts: Vec<&str> = field.split(':').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(ProtocolError::ConfigParse(format!(
            "expression format error: {}",
            field
        )));
    }
    let bits: usize = parts[1]
        .parse()
        .map_err(|_| ProtocolError::ConfigParse(format!("invalid length: {}", parts[1])))?;
    let endian = match parts[3] {
        "BE" => Endian::Big,
        "LE" => Endian::Little,
        other => {
            return Err(ProtocolError::ConfigParse(format!(
                "unsupported byte order: {}",
                other
            )));
        }
    };
    Ok(FieldSpec {
        key: parts[0].to_string(),
        bits,
        kind: parts[2].to_string(),
        endian,
    })
}

fn read_uint(bytes: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
    match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    }
}

/// 按表达式解析字节数组。
pub fn parse_binary(expr: &str, data: &[u8]) -> Result<Map<String, Value>, ProtocolError> {
    let mut out = Map::new();
    let mut cursor = 0usize;
    for field in expr.split(';').map(str::trim).filter(|f| !f.is_empty()) {
        let spec = parse_field(field)?;
        let len = spec.bits.div_ceil(8);
        if cursor + len > data.len() {
            return Err(ProtocolError::DataParse(format!(
                "data length insufficient to parse {}",
                spec.key
            )));
        }
        let bytes = &data[cursor..cursor + len];
        let value = match (spec.kind.as_str(), spec.bits) {
            ("int", 8) => Value::from(bytes[0] as i8 as i64),
            ("int", 16) => Value::from(read_uint(bytes, spec.endian) as u16 as i16 as i64),
            ("int", 32) => Value::from(read_uint(bytes, spec.endian) as u32 as i32 as i64),
            ("int", 64) => Value::from(read_uint(bytes, spec.endian) as i64),
            ("uint", 8 | 16 | 32 | 64) => Value::from(read_uint(bytes, spec.endian)),
            ("int" | "uint", bits) => {
                return Err(ProtocolError::DataParse(format!(
                    "unsupported int length: {} bits",
                    bits
                )));
            }
            ("float", 32) => {
                let v = f32::from_bits(read_uint(bytes, spec.endian) as u32) as f64;
                Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
            }
            ("float", 64) => {
                let v = f64::from_bits(read_uint(bytes, spec.endian));
                Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
            }
            ("float", bits) => {
                return Err(ProtocolError::DataParse(format!(
                    "unsupported float length: {} bits",
                    bits
                )));
            }
            ("string", _) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
            (kind, _) => {
                return Err(ProtocolError::DataParse(format!(
                    "unsupported data type: {}",
                    kind
                )));
            }
        };
        out.insert(spec.key, value);
        cursor += len;
    }
    Ok(out)
}
