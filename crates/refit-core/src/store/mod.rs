/*!
# Rule Store

Compiled rules and migration pairs are persisted one blob per artifact and
loaded back into an immutable [`RuleSet`]. A [`RuleStore`] handle loads its
set at most once, even under concurrent first access, and hands out the
same `Arc<RuleSet>` until [`RuleStore::invalidate`] is called.
*/

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

pub mod format;
pub mod loader;

pub use format::{CompiledArtifact, FORMAT_VERSION, MAGIC};
pub use loader::{read_with_retry, DirectoryLoader, ResourceLoader};

use crate::migration::{compile_migrations, MigrationRulePair};
use crate::rule::Rule;
use crate::template::{extract_rules, TemplateCompiler};
use crate::tree::Node;
use crate::RefitConfig;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read {resource} after {attempts} attempts: {source}")]
    Read {
        resource: String,
        attempts: usize,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Decode(#[from] bincode::Error),

    #[error("{resource} is not a compiled rule")]
    BadMagic { resource: String },

    #[error("{resource} uses unsupported format version {version}")]
    UnsupportedVersion { resource: String, version: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Duplicate rule name: {name}")]
    Duplicate { name: String },
}

/// Immutable name-indexed rules and migration pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: IndexMap<String, Rule>,
    migrations: Vec<MigrationRulePair>,
}

impl RuleSet {
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn migration(&self, name: &str) -> Option<&MigrationRulePair> {
        self.migrations.iter().find(|pair| pair.name == name)
    }

    pub fn migrations(&self) -> &[MigrationRulePair] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.rules.len() + self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every rule name, then every migration pair name
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules
            .keys()
            .map(String::as_str)
            .chain(self.migrations.iter().map(|pair| pair.name.as_str()))
    }

    /// Writes `<name><rule_suffix>` and `<name><migration_suffix>` blobs
    /// into `dir`, creating it if needed.
    pub fn persist(
        &self,
        dir: impl AsRef<Path>,
        config: &RefitConfig,
    ) -> Result<usize, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = 0;
        for rule in self.rules.values() {
            let bytes = format::encode(&CompiledArtifact::Rule(rule.clone()))?;
            fs::write(dir.join(format!("{}{}", rule.name, config.rule_suffix)), bytes)?;
            written += 1;
        }
        for pair in &self.migrations {
            let bytes = format::encode(&CompiledArtifact::Migration(pair.clone()))?;
            fs::write(dir.join(format!("{}{}", pair.name, config.migration_suffix)), bytes)?;
            written += 1;
        }
        info!(dir = %dir.display(), written, "persisted rule set");
        Ok(written)
    }
}

/// Collects artifacts into a [`RuleSet`]. Nothing is added by a call that
/// fails.
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    set: RuleSet,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<&mut Self, StoreError> {
        self.check_free(&rule.name)?;
        self.set.rules.insert(rule.name.clone(), rule);
        Ok(self)
    }

    pub fn add_migration(&mut self, pair: MigrationRulePair) -> Result<&mut Self, StoreError> {
        self.check_free(&pair.name)?;
        self.set.migrations.push(pair);
        Ok(self)
    }

    pub fn add_artifact(&mut self, artifact: CompiledArtifact) -> Result<&mut Self, StoreError> {
        match artifact {
            CompiledArtifact::Rule(rule) => self.add_rule(rule),
            CompiledArtifact::Migration(pair) => self.add_migration(pair),
        }
    }

    /// Compiles every rule and migration declaration in `root`. Template
    /// groups nested in a migration declaration only register as part of
    /// their pair.
    pub fn compile_unit(
        &mut self,
        compiler: &TemplateCompiler,
        root: &Node,
    ) -> crate::Result<&mut Self> {
        let pairs = compile_migrations(compiler, root)?;
        let rules: Vec<Rule> = extract_rules(compiler, root)?
            .into_iter()
            .filter(|rule| !pairs.iter().any(|pair| is_group_of(rule, pair)))
            .collect();

        let mut staged = self.set.clone();
        for artifact in rules
            .into_iter()
            .map(CompiledArtifact::Rule)
            .chain(pairs.into_iter().map(CompiledArtifact::Migration))
        {
            let name = artifact.name().to_string();
            if staged.rules.contains_key(&name) || staged.migration(&name).is_some() {
                return Err(StoreError::Duplicate { name }.into());
            }
            match artifact {
                CompiledArtifact::Rule(rule) => {
                    staged.rules.insert(name, rule);
                }
                CompiledArtifact::Migration(pair) => staged.migrations.push(pair),
            }
        }
        debug!(added = staged.len() - self.set.len(), "compiled unit");
        self.set = staged;
        Ok(self)
    }

    pub fn build(self) -> RuleSet {
        self.set
    }

    fn check_free(&self, name: &str) -> Result<(), StoreError> {
        if self.set.rules.contains_key(name) || self.set.migration(name).is_some() {
            return Err(StoreError::Duplicate { name: name.to_string() });
        }
        Ok(())
    }
}

fn is_group_of(rule: &Rule, pair: &MigrationRulePair) -> bool {
    rule.name == pair.forward.name || rule.name == pair.backward.name
}

/// Lazily loaded, memoized rule set
pub struct RuleStore {
    loader: Box<dyn ResourceLoader>,
    max_read_attempts: usize,
    loaded: Mutex<Option<Arc<RuleSet>>>,
}

impl RuleStore {
    pub fn new(loader: impl ResourceLoader + 'static, config: &RefitConfig) -> Self {
        Self {
            loader: Box::new(loader),
            max_read_attempts: config.max_read_attempts,
            loaded: Mutex::new(None),
        }
    }

    /// Store over the blobs in `config.rule_dir`
    pub fn open(config: &RefitConfig) -> Self {
        let loader = DirectoryLoader::new(
            &config.rule_dir,
            &[config.rule_suffix.as_str(), config.migration_suffix.as_str()],
        );
        Self::new(loader, config)
    }

    /// The loaded rule set; the first call performs the load.
    pub fn rules(&self) -> Result<Arc<RuleSet>, StoreError> {
        let mut loaded = self.loaded.lock();
        if let Some(set) = loaded.as_ref() {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(self.load()?);
        *loaded = Some(Arc::clone(&set));
        Ok(set)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.lock().is_some()
    }

    /// Drops the memoized set; the next [`RuleStore::rules`] reloads.
    pub fn invalidate(&self) {
        if self.loaded.lock().take().is_some() {
            debug!("rule set invalidated");
        }
    }

    fn load(&self) -> Result<RuleSet, StoreError> {
        let names = self.loader.list()?;
        let mut builder = RuleSetBuilder::new();
        for name in &names {
            let bytes = read_with_retry(self.loader.as_ref(), name, self.max_read_attempts)?;
            builder.add_artifact(format::decode(name, &bytes)?)?;
        }
        let set = builder.build();
        info!(
            rules = set.rules.len(),
            migrations = set.migrations.len(),
            "loaded rule set"
        );
        Ok(set)
    }
}
