//! Localized display-string resolution with a per-locale fallback chain.
//!
//! String tables live in locale subfolders next to the definition files,
//! paired by stem. Lookup never fails: a missing folder or file is an empty
//! table, and a key that no table resolves comes back as the literal key
//! marked unresolved. Results are memoized per (namespace, key, locale); the
//! cache is swapped wholesale on locale change so concurrent readers never
//! observe a half-rebuilt cache.

use crate::defs::loader::{STRINGS_SUFFIX, language_of, parse_strings_file};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Locale used as the last table in every fallback chain.
pub const DEFAULT_LOCALE: &str = "en-US";

/// A resolved display string; `resolved` is false when the literal key came
/// back instead of a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayString {
    pub text: String,
    pub resolved: bool,
}

type StringTable = BTreeMap<String, BTreeMap<String, String>>;

pub struct LocaleResolver {
    base_dir: PathBuf,
    /// namespace -> file stem, fixed at catalog build.
    stems: BTreeMap<String, String>,
    active: RwLock<String>,
    /// locale -> (namespace -> strings); loaded lazily, kept across locale
    /// switches since parsed tables are immutable.
    tables: Mutex<BTreeMap<String, StringTable>>,
    /// (namespace, key, locale) -> resolved text; replaced wholesale by
    /// `set_locale`.
    cache: RwLock<HashMap<(String, String, String), DisplayString>>,
}

impl LocaleResolver {
    pub fn new(
        base_dir: PathBuf,
        stems: BTreeMap<String, String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            base_dir,
            stems,
            active: RwLock::new(locale.into()),
            tables: Mutex::new(BTreeMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn locale(&self) -> String {
        self.active.read().expect("locale lock").clone()
    }

    /// Switch the active locale. Parsed definitions are untouched; only the
    /// resolved-string cache is invalidated, and in one swap.
    pub fn set_locale(&self, locale: impl Into<String>) {
        let locale = locale.into();
        *self.active.write().expect("locale lock") = locale;
        *self.cache.write().expect("cache lock") = HashMap::new();
    }

    /// Resolve `key` for `namespace` under the active locale.
    ///
    /// Fallback order: exact locale, language-only locale, default locale,
    /// then the literal key marked unresolved.
    pub fn resolve(&self, namespace: &str, key: &str) -> DisplayString {
        let locale = self.locale();
        let cache_key = (namespace.to_string(), key.to_string(), locale.clone());
        if let Some(hit) = self.cache.read().expect("cache lock").get(&cache_key) {
            return hit.clone();
        }

        let resolved = self.resolve_uncached(namespace, key, &locale);
        self.cache
            .write()
            .expect("cache lock")
            .insert(cache_key, resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, namespace: &str, key: &str, locale: &str) -> DisplayString {
        let mut chain = vec![locale.to_string()];
        let language = language_of(locale);
        if language != locale {
            chain.push(language.to_string());
        }
        if !chain.iter().any(|l| l == DEFAULT_LOCALE) {
            chain.push(DEFAULT_LOCALE.to_string());
        }

        for candidate in &chain {
            let mut tables = self.tables.lock().expect("tables lock");
            let table = tables
                .entry(candidate.clone())
                .or_insert_with(|| self.load_locale(candidate));
            if let Some(text) = table.get(namespace).and_then(|strings| strings.get(key)) {
                return DisplayString {
                    text: text.clone(),
                    resolved: true,
                };
            }
        }

        warn!(namespace, key, locale, "display string unresolved");
        DisplayString {
            text: key.to_string(),
            resolved: false,
        }
    }

    // One locale folder's worth of tables. Missing folders and files are
    // empty tables; malformed files are logged and skipped rather than
    // failing a lookup.
    fn load_locale(&self, locale: &str) -> StringTable {
        let folder = self.base_dir.join(locale);
        let mut table = StringTable::new();
        if !folder.is_dir() {
            debug!(locale, "no resource folder");
            return table;
        }
        for (namespace, stem) in &self.stems {
            let path = folder.join(format!("{stem}{STRINGS_SUFFIX}"));
            if !path.is_file() {
                continue;
            }
            match parse_strings_file(&path) {
                Ok(raw) => {
                    table.insert(namespace.clone(), raw.strings.into_iter().collect());
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping malformed resource file");
                }
            }
        }
        debug!(locale, namespaces = table.len(), "locale table loaded");
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_strings(dir: &std::path::Path, locale: &str, stem: &str, pairs: &[(&str, &str)]) {
        let folder = dir.join(locale);
        fs::create_dir_all(&folder).unwrap();
        let strings: BTreeMap<&str, &str> = pairs.iter().copied().collect();
        let body = serde_json::json!({
            "schema_version": "policy_strings_v1",
            "locale": locale,
            "strings": strings,
        });
        fs::write(
            folder.join(format!("{stem}{STRINGS_SUFFIX}")),
            serde_json::to_string_pretty(&body).unwrap(),
        )
        .unwrap();
    }

    fn resolver(dir: &TempDir, locale: &str) -> LocaleResolver {
        let stems = BTreeMap::from([("Corp.System".to_string(), "corp".to_string())]);
        LocaleResolver::new(dir.path().to_path_buf(), stems, locale)
    }

    #[test]
    fn exact_locale_wins() {
        let dir = TempDir::new().unwrap();
        write_strings(dir.path(), "en-US", "corp", &[("hello", "Hello")]);
        write_strings(dir.path(), "fr-FR", "corp", &[("hello", "Bonjour")]);
        let resolver = resolver(&dir, "fr-FR");
        assert_eq!(resolver.resolve("Corp.System", "hello").text, "Bonjour");
    }

    #[test]
    fn region_falls_back_to_language_then_default() {
        let dir = TempDir::new().unwrap();
        write_strings(dir.path(), "fr", "corp", &[("hello", "Bonjour")]);
        write_strings(dir.path(), "en-US", "corp", &[("hello", "Hello"), ("bye", "Bye")]);
        let resolver = resolver(&dir, "fr-FR");
        // fr-FR folder absent; fr supplies the string
        assert_eq!(resolver.resolve("Corp.System", "hello").text, "Bonjour");
        // fr lacks the key; default locale supplies it
        assert_eq!(resolver.resolve("Corp.System", "bye").text, "Bye");
    }

    #[test]
    fn unresolved_key_comes_back_literally() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, "de-DE");
        let out = resolver.resolve("Corp.System", "no_such_key");
        assert_eq!(out.text, "no_such_key");
        assert!(!out.resolved);
    }

    #[test]
    fn locale_switch_invalidates_cached_strings() {
        let dir = TempDir::new().unwrap();
        write_strings(dir.path(), "en-US", "corp", &[("hello", "Hello")]);
        write_strings(dir.path(), "fr", "corp", &[("hello", "Bonjour")]);
        let resolver = resolver(&dir, "en-US");
        assert_eq!(resolver.resolve("Corp.System", "hello").text, "Hello");
        resolver.set_locale("fr");
        assert_eq!(resolver.resolve("Corp.System", "hello").text, "Bonjour");
    }
}
