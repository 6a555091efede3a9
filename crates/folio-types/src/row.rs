//! Row payloads and their typed storage side-channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KeyError, KeyResult};
use crate::key::StorageKey;
use crate::meta::ObjectMeta;

/// Field name to value mapping persisted for one object.
pub type RowData = serde_json::Map<String, Value>;

/// Row fields that address the object on disk. They drive relocation on
/// save and are never persisted.
pub const KEY_FIELDS: [&str; 5] = ["parent_key", "order", "folder", "template", "lang"];

/// Storage bookkeeping carried next to the payload. Never written to disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    /// Storage key the row was loaded from, if it exists in storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// Copy the folder instead of moving it when the folder changes.
    #[serde(default)]
    pub copy: bool,
    /// Write a new variant file instead of renaming the old one.
    #[serde(default)]
    pub clone: bool,
    /// Meta computed by the storage after the row was read or saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectMeta>,
}

impl RowMeta {
    /// Side-channel for a row stored under `storage_key`.
    pub fn stored(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: Some(storage_key.into()),
            ..Self::default()
        }
    }
}

/// One object's content as exchanged with a row storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub data: RowData,
    #[serde(default)]
    pub meta: RowMeta,
    /// Error marker attached by upstream validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Row {
    pub fn new(data: RowData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Build a row from a JSON value. Non-object values yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self::new(data)),
            _ => None,
        }
    }

    pub fn with_meta(mut self, meta: RowMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(field.into(), value.into());
    }

    /// The storage key the row was loaded from, if any.
    pub fn storage_key(&self) -> Option<&str> {
        self.meta.storage_key.as_deref()
    }

    /// Decode the key the row was loaded from.
    pub fn source_key(&self) -> KeyResult<Option<StorageKey>> {
        self.storage_key().map(StorageKey::parse).transpose()
    }

    /// Compute the key addressed by the row's own key fields.
    ///
    /// Each field falls back to the matching component of `base`. Returns
    /// `Ok(None)` when no folder can be determined.
    pub fn target_key(&self, base: Option<&StorageKey>) -> KeyResult<Option<StorageKey>> {
        let mut key = base.cloned().unwrap_or_default();

        if let Some(parent_key) = self.text_field("parent_key") {
            key.parent_key = parent_key.trim_matches('/').to_string();
        }
        if let Some(order) = self.order_field()? {
            key.order = order;
        }
        if let Some(folder) = self.text_field("folder") {
            key.folder = folder.to_string();
        }
        if let Some(template) = self.text_field("template") {
            key.template = template.to_string();
        }
        if let Some(lang) = self.text_field("lang") {
            key.lang = lang.to_string();
        }

        if key.folder.is_empty() {
            return Ok(None);
        }
        key.validate()?;
        Ok(Some(key))
    }

    /// Remove the key fields from the payload.
    pub fn strip_key_fields(&mut self) {
        for field in KEY_FIELDS {
            self.data.remove(field);
        }
    }

    /// The payload as it is persisted: key fields removed, side-channel
    /// and error marker left behind.
    pub fn into_persisted(mut self) -> RowData {
        self.strip_key_fields();
        self.data
    }

    fn text_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    fn order_field(&self) -> KeyResult<Option<u32>> {
        let parse = |text: &str| {
            text.trim()
                .parse::<u32>()
                .map_err(|_| KeyError::component("order", text, "must be a non-negative integer"))
        };
        match self.data.get("order") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    KeyError::component("order", &n.to_string(), "must be a non-negative integer")
                }),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(0)),
            Some(Value::String(s)) => parse(s).map(Some),
            Some(other) => Err(KeyError::component(
                "order",
                &other.to_string(),
                "must be a non-negative integer",
            )),
        }
    }
}
