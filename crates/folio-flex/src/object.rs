//! Typed objects built from storage rows.

use folio_types::{ObjectMeta, Row, RowData, RowMeta, StorageKey, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object variant produced for a type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Plain field bag.
    #[default]
    Generic,
    /// Content page addressed by a hierarchical storage key.
    Page,
}

impl ObjectKind {
    /// Build the object variant for this kind from a row.
    pub fn create(self, key: impl Into<String>, row: Row) -> FlexObject {
        let base = GenericObject::new(key, row);
        match self {
            Self::Generic => FlexObject::Generic(base),
            Self::Page => FlexObject::Page(PageObject::from_base(base)),
        }
    }
}

/// Merge `patch` into `target`. Nested maps merge recursively; every other
/// value replaces the existing one.
pub fn merge_data(target: &mut RowData, patch: RowData) {
    for (field, value) in patch {
        match (target.get_mut(&field), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_data(existing, nested),
            (_, value) => {
                target.insert(field, value);
            }
        }
    }
}

/// An object with no structure beyond its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct GenericObject {
    key: String,
    storage_key: Option<String>,
    timestamp: Timestamp,
    data: RowData,
    meta: Option<ObjectMeta>,
}

impl GenericObject {
    pub fn new(key: impl Into<String>, row: Row) -> Self {
        Self {
            key: key.into(),
            storage_key: row.meta.storage_key,
            timestamp: 0,
            data: row.data,
            meta: row.meta.object,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn data(&self) -> &RowData {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn object_meta(&self) -> Option<&ObjectMeta> {
        self.meta.as_ref()
    }

    pub fn update(&mut self, patch: RowData) {
        merge_data(&mut self.data, patch);
    }

    /// The row handed to storage when saving this object.
    pub fn prepare_storage(&self) -> Row {
        let meta = RowMeta {
            storage_key: self.storage_key.clone(),
            ..RowMeta::default()
        };
        Row::new(self.data.clone()).with_meta(meta)
    }

    fn apply_row(&mut self, row: Row) {
        if row.meta.storage_key.is_some() {
            self.storage_key = row.meta.storage_key;
        }
        self.data = row.data;
        self.meta = row.meta.object;
    }
}

/// A page: a generic object whose storage key is decoded into its location.
#[derive(Clone, Debug, PartialEq)]
pub struct PageObject {
    base: GenericObject,
    location: Option<StorageKey>,
}

impl PageObject {
    fn from_base(base: GenericObject) -> Self {
        let mut page = Self {
            base,
            location: None,
        };
        page.parse_location();
        page
    }

    fn parse_location(&mut self) {
        self.location = self
            .base
            .storage_key()
            .and_then(|key| StorageKey::parse(key).ok());
    }

    /// Decoded storage key. `None` until the page is stored.
    pub fn location(&self) -> Option<&StorageKey> {
        self.location.as_ref()
    }

    pub fn parent_key(&self) -> Option<&str> {
        self.location.as_ref().map(|k| k.parent_key.as_str())
    }

    pub fn folder(&self) -> Option<&str> {
        self.location.as_ref().map(|k| k.folder.as_str())
    }

    pub fn order(&self) -> u32 {
        self.location.as_ref().map_or(0, |k| k.order)
    }

    /// Template of the stored variant, falling back to the template the
    /// storage resolved for the folder.
    pub fn template(&self) -> Option<&str> {
        self.location
            .as_ref()
            .map(|k| k.template.as_str())
            .filter(|t| !t.is_empty())
            .or_else(|| self.base.object_meta()?.template.as_deref())
    }

    pub fn lang(&self) -> &str {
        self.location.as_ref().map_or("", |k| k.lang.as_str())
    }

    /// Folder path without order prefixes.
    pub fn route(&self) -> Option<String> {
        self.location.as_ref().map(StorageKey::route)
    }

    pub fn is_modular(&self) -> bool {
        self.location.as_ref().is_some_and(StorageKey::is_modular)
    }

    /// Page body.
    pub fn content(&self) -> Option<&str> {
        self.base.get(folio_pages::BODY_FIELD).and_then(Value::as_str)
    }
}

/// One loaded object.
#[derive(Clone, Debug, PartialEq)]
pub enum FlexObject {
    Generic(GenericObject),
    Page(PageObject),
}

impl FlexObject {
    fn base(&self) -> &GenericObject {
        match self {
            Self::Generic(object) => object,
            Self::Page(page) => &page.base,
        }
    }

    fn base_mut(&mut self) -> &mut GenericObject {
        match self {
            Self::Generic(object) => object,
            Self::Page(page) => &mut page.base,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Generic(_) => ObjectKind::Generic,
            Self::Page(_) => ObjectKind::Page,
        }
    }

    /// Logical key within the type's index.
    pub fn key(&self) -> &str {
        self.base().key()
    }

    pub fn storage_key(&self) -> Option<&str> {
        self.base().storage_key()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.base().timestamp()
    }

    pub fn data(&self) -> &RowData {
        self.base().data()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.base().get(field)
    }

    pub fn object_meta(&self) -> Option<&ObjectMeta> {
        self.base().object_meta()
    }

    pub fn as_page(&self) -> Option<&PageObject> {
        match self {
            Self::Page(page) => Some(page),
            Self::Generic(_) => None,
        }
    }

    /// Merge `patch` into the object's fields.
    pub fn update(&mut self, patch: RowData) {
        self.base_mut().update(patch);
    }

    pub fn prepare_storage(&self) -> Row {
        self.base().prepare_storage()
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.base_mut().key = key.into();
    }

    pub fn set_storage_key(&mut self, storage_key: impl Into<String>) {
        self.base_mut().storage_key = Some(storage_key.into());
        if let Self::Page(page) = self {
            page.parse_location();
        }
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.base_mut().timestamp = timestamp;
    }

    /// Take over the fields and storage key of a row returned by a save.
    pub fn apply_saved(&mut self, row: Row) {
        self.base_mut().apply_row(row);
        if let Self::Page(page) = self {
            page.parse_location();
        }
    }
}
