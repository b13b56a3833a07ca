//! User settings and global variable definitions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use promptvar_core::{
    CacheConfig, FileSystemHandle, GlobalVariable, HandleEntry, HandleKind, HandleRef,
    ResolverConfig, SharedHandle, VariableEntry, VariableValue,
};
use promptvar_engine::InMemoryGlobalStore;
use promptvar_fs::{ConsentPolicy, GrantTable, HandleRegistry, JsonRegistryStore, LocalHandle};
use promptvar_parse::ParserOptions;

/// Settings read from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How access requests for local files are answered.
    pub consent: ConsentPolicy,
    /// Where registered handles are persisted.
    pub registry_path: Option<PathBuf>,
    pub parser: ParserOptions,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    /// Global variables shared by every template.
    pub globals: BTreeMap<String, GlobalSpec>,
}

/// One entry of a global variable definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySpec {
    Text(String),
    File(PathBuf),
    Dir(PathBuf),
    /// A handle registered with `promptvar handles register`.
    Handle(String),
}

/// A global variable: plain text, one entry or a list of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlobalSpec {
    Text(String),
    Entry(EntrySpec),
    Entries(Vec<EntrySpec>),
}

impl GlobalSpec {
    fn entries(&self) -> Vec<EntrySpec> {
        match self {
            Self::Text(text) => vec![EntrySpec::Text(text.clone())],
            Self::Entry(entry) => vec![entry.clone()],
            Self::Entries(entries) => entries.clone(),
        }
    }
}

impl Settings {
    /// Get the default config file path.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("promptvar").join("config.toml"))
    }

    /// Load settings from `path`, or from the default location.
    ///
    /// A missing default file yields defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings = Self::from_toml(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        if settings.cache.max_size == 0 {
            bail!("cache.max_size must be at least 1");
        }
        if settings.resolver.max_concurrent_reads == 0 {
            bail!("resolver.max_concurrent_reads must be at least 1");
        }
        Ok(settings)
    }

    /// Registry file location.
    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(JsonRegistryStore::default_path)
    }
}

/// Parse a JSON object of global definitions.
pub fn parse_globals_json(content: &str) -> Result<BTreeMap<String, GlobalSpec>> {
    Ok(serde_json::from_str(content)?)
}

/// Build a global store from the definitions a template references.
///
/// Definitions `used` rejects are skipped without touching their paths.
/// Local paths are opened here; an entry that cannot be opened is logged and
/// left out. Registered handles are referenced by id and reacquired through
/// `registry` when resolved.
pub fn build_global_store(
    specs: &BTreeMap<String, GlobalSpec>,
    used: impl Fn(&str) -> bool,
    grants: &Arc<GrantTable>,
    registry: &HandleRegistry,
) -> InMemoryGlobalStore {
    let store = InMemoryGlobalStore::new();
    for (name, spec) in specs.iter().filter(|(name, _)| used(name.as_str())) {
        let entries = spec
            .entries()
            .into_iter()
            .filter_map(|entry| match to_entry(entry, grants, registry) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(global = %name, "skipping entry: {e:#}");
                    None
                }
            })
            .collect();
        store.insert(GlobalVariable::new(name, VariableValue::new(entries)));
    }
    store
}

fn to_entry(
    spec: EntrySpec,
    grants: &Arc<GrantTable>,
    registry: &HandleRegistry,
) -> Result<VariableEntry> {
    let entry = match spec {
        EntrySpec::Text(text) => VariableEntry::text(text),
        EntrySpec::File(path) => VariableEntry::file(open_kind(&path, HandleKind::File, grants)?),
        EntrySpec::Dir(path) => {
            VariableEntry::directory(open_kind(&path, HandleKind::Directory, grants)?)
        }
        EntrySpec::Handle(id) => {
            let Some(meta) = registry.entry(&id) else {
                bail!("no registered handle with id '{id}'");
            };
            let handle_entry = HandleEntry::new(meta.name.as_str(), HandleRef::registered(id));
            match meta.kind {
                HandleKind::File => VariableEntry::File(handle_entry),
                HandleKind::Directory => VariableEntry::Directory(handle_entry),
            }
        }
    };
    Ok(entry)
}

/// Open a local path and check that it is of the expected kind.
pub fn open_kind(
    path: &Path,
    expected: HandleKind,
    grants: &Arc<GrantTable>,
) -> Result<SharedHandle> {
    let handle = LocalHandle::open(path, grants.clone())?;
    if handle.kind() != expected {
        bail!("{} is not a {expected}", path.display());
    }
    Ok(Arc::new(handle))
}

/// Grant table for this process.
pub fn grant_table(settings: &Settings) -> Arc<GrantTable> {
    Arc::new(GrantTable::new(settings.consent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptvar_engine::GlobalVariableStore;

    #[test]
    fn test_empty_settings_are_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.consent, ConsentPolicy::GrantAll);
        assert!(!settings.parser.strict);
        assert_eq!(settings.resolver.max_concurrent_reads, 4);
        assert!(settings.globals.is_empty());
    }

    #[test]
    fn test_globals_in_toml() {
        let settings = Settings::from_toml(
            r#"
            consent = "read-only"

            [parser]
            strict = true

            [globals]
            author = "Ada"
            notes = { file = "notes.md" }
            context = [{ text = "intro" }, { dir = "src" }, { handle = "file-a-1-0" }]
            "#,
        )
        .unwrap();

        assert_eq!(settings.consent, ConsentPolicy::ReadOnly);
        assert!(settings.parser.strict);
        assert_eq!(settings.globals["author"], GlobalSpec::Text("Ada".into()));
        assert_eq!(
            settings.globals["notes"],
            GlobalSpec::Entry(EntrySpec::File("notes.md".into()))
        );
        let GlobalSpec::Entries(context) = &settings.globals["context"] else {
            panic!("expected entry list");
        };
        assert_eq!(context.len(), 3);
        assert_eq!(context[2], EntrySpec::Handle("file-a-1-0".into()));
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(Settings::from_toml("[resolver]\nmax_concurrent_reads = 0").is_err());
        assert!(Settings::from_toml("[cache]\nmax_size = 0").is_err());
    }

    #[test]
    fn test_globals_json_and_store() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();
        let path = dir.path().join("a.txt");
        let json = format!(
            r#"{{"greeting": "hi", "doc": {{"file": {}}}}}"#,
            serde_json::to_string(&path).unwrap()
        );

        let specs = parse_globals_json(&json).unwrap();
        let grants = Arc::new(GrantTable::new(ConsentPolicy::GrantAll));
        let registry = HandleRegistry::in_memory();
        let store = build_global_store(&specs, |_| true, &grants, &registry);
        assert_eq!(store.len(), 2);

        let only_doc = build_global_store(&specs, |name| name == "doc", &grants, &registry);
        assert_eq!(only_doc.len(), 1);
        assert!(only_doc.get("greeting").is_none());
    }

    #[test]
    fn test_unreferenced_stale_global_is_not_opened() {
        let dir = tempfile::TempDir::new().unwrap();
        let specs = BTreeMap::from([
            ("greeting".to_string(), GlobalSpec::Text("hi".into())),
            (
                "stale".to_string(),
                GlobalSpec::Entry(EntrySpec::File(dir.path().join("gone.md"))),
            ),
        ]);
        let grants = Arc::new(GrantTable::new(ConsentPolicy::GrantAll));
        let registry = HandleRegistry::in_memory();

        let store = build_global_store(&specs, |name| name == "greeting", &grants, &registry);
        assert_eq!(store.len(), 1);
        assert!(store.get("stale").is_none());
    }

    #[test]
    fn test_broken_entries_are_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "A").unwrap();
        let specs = BTreeMap::from([(
            "ctx".to_string(),
            GlobalSpec::Entries(vec![
                EntrySpec::Text("intro".into()),
                EntrySpec::Dir(path.clone()),
                EntrySpec::Handle("nope".into()),
                EntrySpec::File(dir.path().join("gone.md")),
            ]),
        )]);
        let grants = Arc::new(GrantTable::new(ConsentPolicy::GrantAll));
        let registry = HandleRegistry::in_memory();

        let store = build_global_store(&specs, |_| true, &grants, &registry);
        let ctx = store.get("ctx").unwrap();
        assert_eq!(ctx.value.0.len(), 1);
        assert_eq!(ctx.value.materialize(), "intro");
    }
}
