//! 告警条件表达式：`field op literal`，多个条件用 `&&` 连接。
//!
//! 字段支持点号路径（`a.b.c`），字面量支持数字、带引号字符串、`true`/`false`、`null`。
//! 字段不存在或类型不可比较时条件为假。

use crate::error::AlarmError;
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// 长的运算符排在前面，避免 `>=` 被拆成 `>`。
    const TOKENS: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: Vec<String>,
    pub op: CompareOp,
    pub literal: Value,
}

impl Condition {
    fn lookup<'a>(&self, data: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.path.split_first()?;
        let mut current = data.get(first)?;
        for key in rest {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    fn eval(&self, data: &Map<String, Value>) -> bool {
        let Some(actual) = self.lookup(data) else {
            return false;
        };
        match (actual, &self.literal) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).is_some_and(|o| self.op.accepts(o)),
                _ => false,
            },
            (Value::String(a), Value::String(b)) => self.op.accepts(a.cmp(b)),
            (a, b) => match self.op {
                CompareOp::Eq => a == b,
                CompareOp::Ne => a != b,
                _ => false,
            },
        }
    }
}

/// 已解析的告警表达式。
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmExpr {
    source: String,
    conditions: Vec<Condition>,
}

impl AlarmExpr {
    pub fn parse(expr: &str) -> Result<Self, AlarmError> {
        let invalid = |reason: &str| AlarmError::InvalidExpr {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        if expr.trim().is_empty() {
            return Err(invalid("empty expression"));
        }
        let conditions = split_conjunction(expr)
            .into_iter()
            .map(|part| parse_condition(part).map_err(|reason| invalid(&reason)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: expr.to_string(),
            conditions,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn eval(&self, data: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.eval(data))
    }
}

/// 按 `&&` 切分，忽略引号内的内容。
fn split_conjunction(expr: &str) -> Vec<&str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'&' && bytes.get(i + 1) == Some(&b'&') => {
                parts.push(&expr[start..i]);
                i += 1;
                start = i + 1;
            }
            None => {}
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

fn parse_condition(part: &str) -> Result<Condition, String> {
    let part = part.trim();
    let (at, op, token) = find_operator(part).ok_or_else(|| format!("missing operator in `{}`", part))?;
    let field = part[..at].trim();
    let literal = part[at + token.len()..].trim();
    if field.is_empty() {
        return Err("missing field".to_string());
    }
    let path: Vec<String> = field.split('.').map(|s| s.trim().to_string()).collect();
    if path.iter().any(|seg| seg.is_empty() || !seg.chars().all(is_ident_char)) {
        return Err(format!("invalid field `{}`", field));
    }
    Ok(Condition {
        path,
        op,
        literal: parse_literal(literal)?,
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// 第一个不在引号内的比较运算符。
fn find_operator(part: &str) -> Option<(usize, CompareOp, &'static str)> {
    let mut quote: Option<char> = None;
    for (i, c) in part.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {
                let rest = &part[i..];
                for (token, op) in CompareOp::TOKENS {
                    if rest.starts_with(token) {
                        return Some((i, op, token));
                    }
                }
            }
        }
    }
    None
}

fn parse_literal(raw: &str) -> Result<Value, String> {
    if raw.is_empty() {
        return Err("missing literal".to_string());
    }
    match raw {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }
    if raw.len() >= 2 {
        let first = raw.as_bytes()[0];
        let last = raw.as_bytes()[raw.len() - 1];
        if first == b'\'' && last == b'\'' {
            return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
        }
        if first == b'"' && last == b'"' {
            return serde_json::from_str::<String>(raw)
                .map(Value::String)
                .map_err(|e| format!("invalid string literal: {}", e));
        }
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("invalid literal `{}`", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn test_numeric_comparisons() {
        let input = data(json!({"temp": 30, "hum": 55.5}));
        assert!(AlarmExpr::parse("temp > 25").unwrap().eval(&input));
        assert!(AlarmExpr::parse("temp >= 30").unwrap().eval(&input));
        assert!(!AlarmExpr::parse("temp < 30").unwrap().eval(&input));
        assert!(AlarmExpr::parse("hum <= 55.5 && temp != 31").unwrap().eval(&input));
        assert!(!AlarmExpr::parse("hum == 55 && temp == 30").unwrap().eval(&input));
    }

    #[test]
    fn test_strings_bools_and_paths() {
        let input = data(json!({"meta": {"status": "fault", "online": false}, "v": null}));
        assert!(AlarmExpr::parse("meta.status == 'fault'").unwrap().eval(&input));
        assert!(AlarmExpr::parse(r#"meta.status == "fault""#).unwrap().eval(&input));
        assert!(AlarmExpr::parse("meta.online == false").unwrap().eval(&input));
        assert!(AlarmExpr::parse("v == null").unwrap().eval(&input));
        assert!(!AlarmExpr::parse("meta.missing == 1").unwrap().eval(&input));
        assert!(!AlarmExpr::parse("meta.online > 1").unwrap().eval(&input));
    }

    #[test]
    fn test_quoted_operators_are_literal() {
        let expr = AlarmExpr::parse("msg == 'a && b >= c'").unwrap();
        assert_eq!(expr.conditions().len(), 1);
        assert!(expr.eval(&data(json!({"msg": "a && b >= c"}))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(AlarmExpr::parse("").is_err());
        assert!(AlarmExpr::parse("temp").is_err());
        assert!(AlarmExpr::parse("temp >").is_err());
        assert!(AlarmExpr::parse("> 3").is_err());
        assert!(AlarmExpr::parse("temp > abc").is_err());
        assert!(AlarmExpr::parse("te mp > 1").is_err());
        assert!(AlarmExpr::parse("temp > 1 && ").is_err());
    }
}
