//! External data sources, one per automated tier.
//!
//! A [`Source`] answers "what is this field's value for this entity?" with a
//! value, a clean "nothing here", or a classified [`SourceError`]. Sources
//! never touch the field store.

mod dataset;
mod http;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vantage_core::{
  entity::Entity,
  field::{FieldData, FieldKind, FieldSpec, MoneyValue},
};

pub use dataset::StaticDataset;
pub use http::HttpSource;

/// How a single tier failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
  Timeout,
  Unreachable,
  /// The response arrived but could not be turned into a value of the
  /// field's kind.
  ParseError,
  RateLimited,
}

impl fmt::Display for SourceErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Timeout => "timeout",
      Self::Unreachable => "unreachable",
      Self::ParseError => "parse_error",
      Self::RateLimited => "rate_limited",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SourceError {
  pub kind:    SourceErrorKind,
  pub message: String,
}

impl SourceError {
  pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
    Self { kind, message: message.into() }
  }

  pub fn parse(message: impl Into<String>) -> Self {
    Self::new(SourceErrorKind::ParseError, message)
  }
}

/// One tier's data provider.
#[async_trait]
pub trait Source: Send + Sync {
  /// Short identifier used in logs.
  fn name(&self) -> &str;

  /// Fetch `field` for `entity`. `Ok(None)` means the source answered but
  /// has no value.
  async fn fetch(
    &self,
    entity: &Entity,
    field: &FieldSpec,
  ) -> Result<Option<FieldData>, SourceError>;
}

/// Interpret a raw JSON value as data for `spec`. `null` is "no value"; a
/// value of the wrong shape is a [`SourceErrorKind::ParseError`].
pub fn decode_value(
  spec: &FieldSpec,
  raw: &serde_json::Value,
) -> Result<Option<FieldData>, SourceError> {
  use serde_json::Value;

  if raw.is_null() {
    return Ok(None);
  }
  let mismatch = || {
    SourceError::parse(format!(
      "field {} expects {}, got {}",
      spec.name,
      spec.kind,
      kind_name(raw)
    ))
  };

  let data = match (spec.kind, raw) {
    (FieldKind::Text, Value::String(s)) => FieldData::Text(s.trim().to_owned()),
    (FieldKind::Category, Value::String(s)) => FieldData::Category(s.trim().to_owned()),
    (FieldKind::Number, Value::Number(n)) => {
      FieldData::Number(n.as_f64().ok_or_else(mismatch)?)
    }
    (FieldKind::Money, Value::Object(_)) => FieldData::Money(
      serde_json::from_value::<MoneyValue>(raw.clone())
        .map_err(|e| SourceError::parse(format!("field {}: {e}", spec.name)))?,
    ),
    (FieldKind::List, Value::Array(items)) => FieldData::List(
      items
        .iter()
        .map(|item| item.as_str().map(|s| s.trim().to_owned()).ok_or_else(mismatch))
        .collect::<Result<_, _>>()?,
    ),
    (FieldKind::Flag, Value::Bool(b)) => FieldData::Flag(*b),
    _ => return Err(mismatch()),
  };

  Ok((!data.is_blank()).then_some(data))
}

fn kind_name(value: &serde_json::Value) -> &'static str {
  use serde_json::Value;
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use vantage_core::field::FieldCatalog;

  use super::*;

  fn spec(name: &str) -> FieldSpec {
    FieldCatalog::default().require(name).unwrap().clone()
  }

  #[test]
  fn decodes_each_kind() {
    assert_eq!(
      decode_value(&spec("ceo"), &json!(" Ada ")).unwrap(),
      Some(FieldData::Text("Ada".into()))
    );
    assert_eq!(
      decode_value(&spec("employee_count"), &json!(250)).unwrap(),
      Some(FieldData::Number(250.0))
    );
    assert_eq!(
      decode_value(&spec("revenue"), &json!({"amount": 5.0e6, "currency": "EUR"}))
        .unwrap(),
      Some(FieldData::Money(MoneyValue { amount: 5.0e6, currency: "EUR".into() }))
    );
    assert_eq!(
      decode_value(&spec("product_lines"), &json!(["A", "B"])).unwrap(),
      Some(FieldData::List(vec!["A".into(), "B".into()]))
    );
  }

  #[test]
  fn null_and_blank_are_empty() {
    assert_eq!(decode_value(&spec("ceo"), &json!(null)).unwrap(), None);
    assert_eq!(decode_value(&spec("ceo"), &json!("   ")).unwrap(), None);
  }

  #[test]
  fn wrong_shape_is_parse_error() {
    let err = decode_value(&spec("employee_count"), &json!("many")).unwrap_err();
    assert_eq!(err.kind, SourceErrorKind::ParseError);
  }
}
