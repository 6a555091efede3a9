//! Storage key codec.
//!
//! A storage key names one object inside the hierarchical store:
//!
//! ```text
//! parent/[NN.]folder[|template[.lang]]
//! ```
//!
//! `NN` is the manual sort order, printed with two digits and present only
//! when the order is non-zero. The `|template.lang` suffix ("params") selects
//! one variant file inside the folder and is present only when the template
//! or the language is set.

use std::fmt;
use std::str::FromStr;

use crate::error::{KeyError, KeyResult};

/// Separates the folder path from the variant params.
pub const PARAMS_DELIMITER: char = '|';

/// Folder names starting with this character are modular children: their
/// modification time counts towards their parent.
pub const MODULE_MARKER: char = '_';

/// Split a storage key into its folder path and its params.
///
/// ```
/// use folio_types::key::split_params;
///
/// assert_eq!(split_params("blog/01.post|item.fr"), ("blog/01.post", "item.fr"));
/// assert_eq!(split_params("blog"), ("blog", ""));
/// ```
pub fn split_params(key: &str) -> (&str, &str) {
    key.split_once(PARAMS_DELIMITER).unwrap_or((key, ""))
}

/// Split params into template and language.
pub fn split_variant(params: &str) -> (&str, &str) {
    params.split_once('.').unwrap_or((params, ""))
}

/// Split a folder name into its order prefix and the bare folder.
///
/// Names without a numeric prefix (or with one too large to represent) have
/// order `0` and are returned unchanged.
pub fn split_order(name: &str) -> (u32, &str) {
    if let Some((digits, rest)) = name.split_once('.') {
        if is_order_digits(digits) && !rest.is_empty() {
            if let Ok(order) = digits.parse::<u32>() {
                return (order, rest);
            }
        }
    }
    (0, name)
}

/// Remove the order prefix from every segment of a slash-separated path.
///
/// ```
/// use folio_types::key::strip_order_prefixes;
///
/// assert_eq!(strip_order_prefixes("01.blog/03.news"), "blog/news");
/// assert_eq!(strip_order_prefixes("about"), "about");
/// ```
pub fn strip_order_prefixes(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.split_once('.') {
            Some((digits, rest)) if is_order_digits(digits) => rest,
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_order_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn has_order_prefix(name: &str) -> bool {
    matches!(name.split_once('.'), Some((digits, rest)) if is_order_digits(digits) && !rest.is_empty())
}

/// Logical identity of a stored object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StorageKey {
    /// Slash-separated ancestor path (may carry order prefixes); empty at the root.
    pub parent_key: String,
    /// Manual sort order; `0` means unordered.
    pub order: u32,
    /// Folder slug. Never empty.
    pub folder: String,
    /// Variant template; empty selects the node's default variant.
    pub template: String,
    /// Locale code; empty means no locale.
    pub lang: String,
    /// Folder name as found on disk when it is not the canonical
    /// `NN.folder` rendering (`1.intro`, `00.intro`). Ignored once `order`
    /// or `folder` no longer match it.
    pub raw_name: Option<String>,
}

impl StorageKey {
    /// Create a validated key for `folder` under `parent_key`.
    pub fn new(parent_key: impl Into<String>, folder: impl Into<String>) -> KeyResult<Self> {
        let key = Self {
            parent_key: parent_key.into(),
            folder: folder.into(),
            ..Self::default()
        };
        key.validate()?;
        Ok(key)
    }

    /// Set the manual sort order.
    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Set the variant template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set the variant language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Drop the template and language, keeping the folder identity.
    pub fn without_params(&self) -> Self {
        Self {
            template: String::new(),
            lang: String::new(),
            ..self.clone()
        }
    }

    /// Decode a storage key string.
    ///
    /// Fails only when no folder remains once the params and the order
    /// prefix are stripped.
    pub fn parse(key: &str) -> KeyResult<Self> {
        let (path, params) = split_params(key);
        let (template, lang) = split_variant(params);
        let path = path.trim_matches('/');
        let (parent_key, name) = path.rsplit_once('/').unwrap_or(("", path));
        let (order, folder) = split_order(name);

        if folder.is_empty() {
            return Err(KeyError::malformed(key, "folder segment is empty"));
        }

        let mut parsed = Self {
            parent_key: parent_key.trim_matches('/').to_string(),
            order,
            folder: folder.to_string(),
            template: template.to_string(),
            lang: lang.to_string(),
            raw_name: None,
        };
        if parsed.folder_name() != name {
            parsed.raw_name = Some(name.to_string());
        }
        Ok(parsed)
    }

    /// Encode the key, with or without the `|template.lang` suffix.
    pub fn build(&self, include_params: bool) -> String {
        let mut key = self.folder_key();
        if include_params {
            let params = self.params();
            if !params.is_empty() {
                key.push(PARAMS_DELIMITER);
                key.push_str(&params);
            }
        }
        key
    }

    /// The on-disk folder name, including the order prefix.
    ///
    /// A parsed name is kept verbatim while it still spells the key's order
    /// and folder; otherwise the order is printed with two digits.
    pub fn folder_name(&self) -> String {
        if let Some(raw) = &self.raw_name {
            if split_order(raw) == (self.order, self.folder.as_str()) {
                return raw.clone();
            }
        }
        if self.order > 0 {
            format!("{:02}.{}", self.order, self.folder)
        } else {
            self.folder.clone()
        }
    }

    /// The folder path relative to the data root (the key without params).
    pub fn folder_key(&self) -> String {
        if self.parent_key.is_empty() {
            self.folder_name()
        } else {
            format!("{}/{}", self.parent_key, self.folder_name())
        }
    }

    /// The `template[.lang]` params; empty when neither is set.
    pub fn params(&self) -> String {
        if self.lang.is_empty() {
            self.template.clone()
        } else {
            format!("{}.{}", self.template, self.lang)
        }
    }

    /// Returns `true` when the key selects a specific variant.
    pub fn has_params(&self) -> bool {
        !self.template.is_empty() || !self.lang.is_empty()
    }

    /// The folder path with every order prefix removed.
    pub fn route(&self) -> String {
        strip_order_prefixes(&self.folder_key())
    }

    /// Returns `true` when the folder is a modular child of its parent.
    pub fn is_modular(&self) -> bool {
        self.folder.starts_with(MODULE_MARKER)
    }

    /// Check that every component lies in the legal domain, where
    /// [`StorageKey::parse`] and [`StorageKey::build`] are mutual inverses.
    pub fn validate(&self) -> KeyResult<()> {
        if self.folder.is_empty() {
            return Err(KeyError::component("folder", &self.folder, "must not be empty"));
        }
        if self.folder.contains(['/', PARAMS_DELIMITER]) {
            return Err(KeyError::component(
                "folder",
                &self.folder,
                "must not contain '/' or '|'",
            ));
        }
        if self.folder == "." || self.folder == ".." {
            return Err(KeyError::component("folder", &self.folder, "must not be a dot segment"));
        }
        if has_order_prefix(&self.folder) {
            return Err(KeyError::component(
                "folder",
                &self.folder,
                "must not start with an order prefix",
            ));
        }

        if let Some(raw) = &self.raw_name {
            if raw.contains(['/', PARAMS_DELIMITER]) {
                return Err(KeyError::component("raw_name", raw, "must not contain '/' or '|'"));
            }
        }

        for (field, value) in [("template", &self.template), ("lang", &self.lang)] {
            if value.contains(['.', '/', PARAMS_DELIMITER]) {
                return Err(KeyError::component(field, value, "must not contain '.', '/' or '|'"));
            }
        }

        if !self.parent_key.is_empty() {
            if self.parent_key.contains(PARAMS_DELIMITER) {
                return Err(KeyError::component(
                    "parent_key",
                    &self.parent_key,
                    "must not contain '|'",
                ));
            }
            for segment in self.parent_key.split('/') {
                if segment.is_empty() || segment == "." || segment == ".." {
                    return Err(KeyError::component(
                        "parent_key",
                        &self.parent_key,
                        format!("invalid path segment {segment:?}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build(true))
    }
}

impl FromStr for StorageKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
