//! Node metadata computed from one folder of the content tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checksum::ContentHasher;
use crate::key::{StorageKey, MODULE_MARKER, PARAMS_DELIMITER};
use crate::natural::NaturalKey;

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// Variant files of a node: language (empty for untranslated files), then
/// template, then modification time.
pub type MarkdownMap = BTreeMap<NaturalKey, BTreeMap<NaturalKey, Timestamp>>;

/// Child folders of a node and their timestamps; `None` until the index
/// build has resolved the child.
pub type ChildMap = BTreeMap<NaturalKey, Option<Timestamp>>;

/// Cacheable description of one storage node.
///
/// The `checksum` covers every other field. A meta whose checksum no longer
/// matches its contents must not be treated as fresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Route: the storage key with every order prefix stripped.
    pub key: String,
    /// Folder path relative to the data root, without params.
    pub storage_key: String,
    /// Default variant template, if the node has any variant files.
    pub template: Option<String>,
    /// Newest modification time of the node's own files.
    pub storage_timestamp: Timestamp,
    #[serde(default)]
    pub markdown: MarkdownMap,
    #[serde(default)]
    pub children: ChildMap,
    pub checksum: String,
}

impl Meta {
    /// Meta for an addressable node that does not exist on disk.
    pub fn missing(key: impl Into<String>, storage_key: impl Into<String>) -> Self {
        let mut meta = Self {
            key: key.into(),
            storage_key: storage_key.into(),
            template: None,
            storage_timestamp: 0,
            markdown: MarkdownMap::new(),
            children: ChildMap::new(),
            checksum: String::new(),
        };
        meta.seal();
        meta
    }

    /// Compute the checksum over every field except `checksum`.
    pub fn compute_checksum(&self) -> String {
        let mut digest = ContentHasher::META.start();
        digest.str(&self.key).str(&self.storage_key);
        match &self.template {
            Some(template) => digest.tag(1).str(template),
            None => digest.tag(0),
        };
        digest.int(self.storage_timestamp);

        digest.tag(b'm').int(self.markdown.len() as i64);
        for (lang, templates) in &self.markdown {
            digest.str(lang).int(templates.len() as i64);
            for (template, mtime) in templates {
                digest.str(template).int(*mtime);
            }
        }

        digest.tag(b'c').int(self.children.len() as i64);
        for (name, timestamp) in &self.children {
            digest.str(name);
            match timestamp {
                Some(ts) => digest.tag(1).int(*ts),
                None => digest.tag(0),
            };
        }

        digest.finish()
    }

    /// Recompute and store the checksum.
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Returns `true` if the stored checksum matches the contents.
    pub fn verify_checksum(&self) -> bool {
        !self.checksum.is_empty() && self.checksum == self.compute_checksum()
    }

    /// The default template: the first template of the untranslated group
    /// when it exists, otherwise the first template of the first language.
    pub fn default_template(&self) -> Option<&str> {
        let group = self
            .markdown
            .get(&NaturalKey::from(""))
            .or_else(|| self.markdown.values().next())?;
        group.keys().next().map(|t| t.as_str())
    }

    /// Modification time of one variant file.
    pub fn variant_timestamp(&self, template: &str, lang: &str) -> Option<Timestamp> {
        self.markdown
            .get(&NaturalKey::from(lang))?
            .get(&NaturalKey::from(template))
            .copied()
    }

    /// Every variant as `(lang, template, mtime)`, in natural order.
    pub fn variants(&self) -> impl Iterator<Item = (&str, &str, Timestamp)> + '_ {
        self.markdown.iter().flat_map(|(lang, templates)| {
            templates
                .iter()
                .map(move |(template, mtime)| (lang.as_str(), template.as_str(), *mtime))
        })
    }

    /// Newest resolved timestamp among modular children, or `0`.
    pub fn modular_timestamp(&self) -> Timestamp {
        self.children
            .iter()
            .filter(|(name, _)| name.starts_with(MODULE_MARKER))
            .filter_map(|(_, ts)| *ts)
            .max()
            .unwrap_or(0)
    }

    /// Returns `true` if the folder holds any file or child folder.
    pub fn is_populated(&self) -> bool {
        !self.markdown.is_empty() || !self.children.is_empty()
    }

    /// Resolve the variant selected by `key` against this node.
    ///
    /// An empty template falls back to the first template of the requested
    /// language, then to the node default.
    pub fn object_meta(&self, key: &StorageKey) -> ObjectMeta {
        let lang = key.lang.clone();
        let template = if key.template.is_empty() {
            self.markdown
                .get(&NaturalKey::from(lang.as_str()))
                .and_then(|group| group.keys().next())
                .map(|t| t.to_string())
                .or_else(|| self.template.clone())
        } else {
            Some(key.template.clone())
        };

        let exists = match &template {
            Some(template) => {
                !self.children.is_empty() || self.variant_timestamp(template, &lang).is_some()
            }
            None => false,
        };

        let params = key.params();
        let storage_key = if params.is_empty() {
            self.storage_key.clone()
        } else {
            format!("{}{PARAMS_DELIMITER}{params}", self.storage_key)
        };

        ObjectMeta {
            storage_key,
            template,
            lang,
            exists,
            node: self.clone(),
        }
    }
}

/// A node meta resolved for one concrete variant key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Full storage key including params.
    pub storage_key: String,
    /// Resolved template of the variant.
    pub template: Option<String>,
    /// Language of the variant; empty when untranslated.
    pub lang: String,
    /// Whether the variant exists on disk.
    pub exists: bool,
    /// The underlying node meta.
    pub node: Meta,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Meta {
        let mut markdown = MarkdownMap::new();
        markdown
            .entry(NaturalKey::from(""))
            .or_default()
            .insert(NaturalKey::from("item"), 100);
        markdown
            .entry(NaturalKey::from("fr"))
            .or_default()
            .insert(NaturalKey::from("item"), 200);
        let mut children = ChildMap::new();
        children.insert(NaturalKey::from("_hero"), Some(500));
        children.insert(NaturalKey::from("gallery"), Some(900));
        let mut meta = Meta {
            key: "news".into(),
            storage_key: "03.news".into(),
            template: Some("item".into()),
            storage_timestamp: 200,
            markdown,
            children,
            checksum: String::new(),
        };
        meta.seal();
        meta
    }

    #[test]
    fn sealed_meta_verifies() {
        let meta = sample();
        assert!(meta.verify_checksum());
    }

    #[test]
    fn tampering_breaks_checksum() {
        let mut meta = sample();
        meta.storage_timestamp += 1;
        assert!(!meta.verify_checksum());
        meta.seal();
        assert!(meta.verify_checksum());
    }

    #[test]
    fn unsealed_meta_never_verifies() {
        let mut meta = sample();
        meta.checksum.clear();
        assert!(!meta.verify_checksum());
    }

    #[test]
    fn missing_meta_is_zeroed() {
        let meta = Meta::missing("about", "about");
        assert_eq!(meta.storage_timestamp, 0);
        assert!(meta.markdown.is_empty());
        assert!(meta.children.is_empty());
        assert!(meta.template.is_none());
        assert!(meta.verify_checksum());
    }

    #[test]
    fn default_template_prefers_untranslated_group() {
        let mut meta = sample();
        meta.markdown
            .entry(NaturalKey::from("de"))
            .or_default()
            .insert(NaturalKey::from("alpha"), 1);
        assert_eq!(meta.default_template(), Some("item"));

        meta.markdown.remove(&NaturalKey::from(""));
        // "de" sorts before "fr".
        assert_eq!(meta.default_template(), Some("alpha"));
    }

    #[test]
    fn modular_timestamp_only_counts_marker_children() {
        assert_eq!(sample().modular_timestamp(), 500);
    }

    #[test]
    fn object_meta_resolves_language_variant() {
        let meta = sample();
        let key = StorageKey::parse("03.news|.fr").unwrap();
        let object = meta.object_meta(&key);
        assert_eq!(object.template.as_deref(), Some("item"));
        assert_eq!(object.lang, "fr");
        assert!(object.exists);
        assert_eq!(object.storage_key, "03.news|.fr");
    }

    #[test]
    fn object_meta_missing_variant() {
        let mut meta = sample();
        meta.children.clear();
        meta.seal();
        let key = StorageKey::parse("03.news|item.de").unwrap();
        assert!(!meta.object_meta(&key).exists);
    }

    #[test]
    fn variants_iterate_in_order() {
        let meta = sample();
        let variants: Vec<_> = meta.variants().collect();
        assert_eq!(variants, vec![("", "item", 100), ("fr", "item", 200)]);
    }

    #[test]
    fn serde_roundtrip_preserves_checksum() {
        let meta = sample();
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: Meta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
        assert!(parsed.verify_checksum());
    }
}
