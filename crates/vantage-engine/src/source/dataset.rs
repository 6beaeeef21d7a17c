//! The known-fallback tier: a static, pre-populated dataset.

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use vantage_core::{
  entity::Entity,
  field::{FieldData, FieldSpec},
};

use super::{Source, SourceError, decode_value};
use crate::Result;

/// `{slug: {field: value}}`, loaded once and served from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticDataset {
  name:    String,
  records: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl StaticDataset {
  pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
    Ok(Self {
      name:    name.into(),
      records: serde_json::from_str(json)?,
    })
  }

  pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path).await?;
    let dataset = Self::from_json(path.display().to_string(), &json)?;
    tracing::info!(
      path = %path.display(),
      entities = dataset.records.len(),
      "loaded fallback dataset"
    );
    Ok(dataset)
  }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

#[async_trait]
impl Source for StaticDataset {
  fn name(&self) -> &str { &self.name }

  async fn fetch(
    &self,
    entity: &Entity,
    field: &FieldSpec,
  ) -> Result<Option<FieldData>, SourceError> {
    match self
      .records
      .get(&entity.slug)
      .and_then(|fields| fields.get(&field.name))
    {
      Some(raw) => decode_value(field, raw),
      None => Ok(None),
    }
  }
}
