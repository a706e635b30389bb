//! Entry categories and the strategies that parameterize a migration.

use crate::schema::SchemaSnapshot;
use crate::transform::{DnRule, EntryTransformer};
use crate::Result;
use dirmigrate_core::config::{KindSettings, MigrationConfig, NameList};
use dirmigrate_core::{AttributeFilter, Error, SearchFilter};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Name of the strategy built from the top-level `[source]`, `[target]` and `[migration]` keys.
pub const DEFAULT_STRATEGY: &str = "default";

/// Where and what to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Search base.
    pub base_dn: String,
    /// Filters combined with AND.
    pub filters: Vec<AttributeFilter>,
}

impl SearchQuery {
    /// Creates a query.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, filters: Vec<AttributeFilter>) -> Self {
        Self {
            base_dn: base_dn.into(),
            filters,
        }
    }

    /// One `objectClass` equality filter per class.
    #[must_use]
    pub fn object_classes<I, S>(base_dn: impl Into<String>, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(base_dn, SearchFilter::object_classes(classes).into_filters())
    }
}

/// Built-in entry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Person accounts.
    Users,
    /// Groups.
    Groups,
}

impl EntryKind {
    /// All presets, in the order they should run.
    pub const ALL: [Self; 2] = [Self::Users, Self::Groups];

    /// Looks up a preset by its strategy name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Strategy name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
        }
    }

    /// objectClass selecting these entries in an Active Directory source.
    #[must_use]
    pub const fn source_object_class(self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Groups => "group",
        }
    }

    /// objectClass of the sample entry in an OpenLDAP style target.
    #[must_use]
    pub const fn target_object_class(self) -> &'static str {
        match self {
            Self::Users => "inetOrgPerson",
            Self::Groups => "groupOfNames",
        }
    }

    /// Default RDN attribute.
    #[must_use]
    pub const fn prefix_attribute(self) -> &'static str {
        "cn"
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything that differs between entry categories; the driver is otherwise identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStrategy {
    name: String,
    source_query: SearchQuery,
    target_query: SearchQuery,
    dn_rule: DnRule,
    attribute_whitelist: Option<HashSet<String>>,
    restrict_object_classes: bool,
}

impl EntryStrategy {
    /// Creates a strategy whose schema sample is searched with the source query.
    #[must_use]
    pub fn new(name: impl Into<String>, source_query: SearchQuery, dn_rule: DnRule) -> Self {
        Self {
            name: name.into(),
            target_query: source_query.clone(),
            source_query,
            dn_rule,
            attribute_whitelist: None,
            restrict_object_classes: false,
        }
    }

    /// Searches the target for the schema sample with a different query.
    #[must_use]
    pub fn with_target_query(mut self, query: SearchQuery) -> Self {
        self.target_query = query;
        self
    }

    /// Only copy the named attributes (case-insensitive).
    #[must_use]
    pub fn with_attribute_whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attribute_whitelist = Some(
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Drop objectClass values the target sample does not carry.
    #[must_use]
    pub const fn with_restricted_object_classes(mut self, restrict: bool) -> Self {
        self.restrict_object_classes = restrict;
        self
    }

    /// Strategy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query selecting the entries to migrate.
    #[must_use]
    pub const fn source_query(&self) -> &SearchQuery {
        &self.source_query
    }

    /// Query selecting the target schema sample.
    #[must_use]
    pub const fn target_query(&self) -> &SearchQuery {
        &self.target_query
    }

    /// Naming rule for created entries.
    #[must_use]
    pub const fn dn_rule(&self) -> &DnRule {
        &self.dn_rule
    }

    /// Lower-cased whitelist, if any.
    #[must_use]
    pub const fn attribute_whitelist(&self) -> Option<&HashSet<String>> {
        self.attribute_whitelist.as_ref()
    }

    /// Whether objectClass values are restricted to the sample.
    #[must_use]
    pub const fn restricts_object_classes(&self) -> bool {
        self.restrict_object_classes
    }

    /// Transformer for this strategy over a discovered schema.
    #[must_use]
    pub fn transformer<'a>(&'a self, schema: Option<&'a SchemaSnapshot>) -> EntryTransformer<'a> {
        EntryTransformer::new(&self.dn_rule, schema)
            .with_whitelist(self.attribute_whitelist.as_ref())
            .restrict_object_classes(self.restrict_object_classes)
    }
}

/// Strategies by name.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<EntryStrategy>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every strategy a configuration describes.
    ///
    /// The default strategy exists when `[source] object_classes` and both `[migration]` DN keys
    /// are set. Each `[kinds.<name>]` table adds one more; `users` and `groups` start from the
    /// [`EntryKind`] presets, other names inherit the `[source]`/`[target]` object classes.
    /// Presets are registered in [`EntryKind::ALL`] order, custom kinds after them by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if a kind is missing a required value or the configuration
    /// yields no strategy at all.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        let mut registry = Self::new();

        match default_strategy(config)? {
            Some(strategy) => registry.insert(strategy),
            None => debug!("no default strategy configured"),
        }
        let mut kinds: Vec<_> = config.kinds.iter().collect();
        kinds.sort_by_key(|(name, _)| preset_rank(name));
        for (name, settings) in kinds {
            registry.insert(kind_strategy(config, name, settings)?);
        }

        if registry.is_empty() {
            return Err(Error::ConfigError(
                "no migration strategy configured: set [source] object_classes and the \
                 [migration] DN rule, or add a [kinds.<name>] table"
                    .to_string(),
            ));
        }
        Ok(registry)
    }

    /// Adds a strategy, replacing one with the same name.
    pub fn insert(&mut self, strategy: EntryStrategy) {
        match self
            .strategies
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&strategy.name))
        {
            Some(existing) => *existing = strategy,
            None => self.strategies.push(strategy),
        }
    }

    /// Looks up a strategy (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntryStrategy> {
        self.strategies
            .iter()
            .find(|strategy| strategy.name.eq_ignore_ascii_case(name))
    }

    /// Strategy names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.strategies.iter().map(EntryStrategy::name)
    }

    /// All strategies in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, EntryStrategy> {
        self.strategies.iter()
    }

    /// Number of strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Resolves requested names in the order given. An empty request selects everything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for the first unknown name.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&EntryStrategy>> {
        if names.is_empty() {
            return Ok(self.strategies.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name).ok_or_else(|| {
                    Error::NotFound(format!(
                        "strategy `{name}` (available: {})",
                        self.names().collect::<Vec<_>>().join(", ")
                    ))
                })
            })
            .collect()
    }
}

fn default_strategy(config: &MigrationConfig) -> Result<Option<EntryStrategy>> {
    let migration = &config.migration;
    let (Some(prefix), Some(suffix)) = (
        migration.new_entry_prefix_attribute.as_deref(),
        migration.new_entry_suffix.as_deref(),
    ) else {
        return Ok(None);
    };
    if config.source.object_classes.is_empty() {
        return Ok(None);
    }

    let source_query = SearchQuery::object_classes(
        config.source.base_dn.clone(),
        config.source.object_classes.as_slice().iter().cloned(),
    );
    let target_classes = if config.target.object_classes.is_empty() {
        &config.source.object_classes
    } else {
        &config.target.object_classes
    };
    let target_query = SearchQuery::object_classes(
        config.target.base_dn.clone(),
        target_classes.as_slice().iter().cloned(),
    );

    Ok(Some(
        EntryStrategy::new(DEFAULT_STRATEGY, source_query, DnRule::new(prefix, suffix)?)
            .with_target_query(target_query),
    ))
}

fn kind_strategy(
    config: &MigrationConfig,
    name: &str,
    settings: &KindSettings,
) -> Result<EntryStrategy> {
    let preset = EntryKind::from_name(name);
    let missing = |field: &str| Error::ConfigError(format!("kinds.{name}: {field} is required"));

    let source_classes = class_names(
        settings.source_object_classes.as_ref(),
        preset.map(EntryKind::source_object_class),
        &config.source.object_classes,
    );
    if source_classes.is_empty() {
        return Err(missing("source_object_classes"));
    }
    let mut target_classes = class_names(
        settings.target_object_classes.as_ref(),
        preset.map(EntryKind::target_object_class),
        &config.target.object_classes,
    );
    if target_classes.is_empty() {
        target_classes.clone_from(&source_classes);
    }

    let prefix = settings
        .new_entry_prefix_attribute
        .as_deref()
        .or(config.migration.new_entry_prefix_attribute.as_deref())
        .or(preset.map(EntryKind::prefix_attribute))
        .ok_or_else(|| missing("new_entry_prefix_attribute"))?;
    let suffix = settings
        .new_entry_suffix
        .as_deref()
        .or(config.migration.new_entry_suffix.as_deref())
        .ok_or_else(|| missing("new_entry_suffix"))?;

    let source_base = settings
        .source_base_dn
        .clone()
        .unwrap_or_else(|| config.source.base_dn.clone());
    let target_base = settings
        .target_base_dn
        .clone()
        .unwrap_or_else(|| config.target.base_dn.clone());

    let mut strategy = EntryStrategy::new(
        name,
        SearchQuery::object_classes(source_base, source_classes),
        DnRule::new(prefix, suffix)?,
    )
    .with_target_query(SearchQuery::object_classes(target_base, target_classes))
    .with_restricted_object_classes(settings.restrict_object_classes);
    if let Some(whitelist) = &settings.attribute_whitelist {
        strategy = strategy.with_attribute_whitelist(whitelist.as_slice());
    }

    debug!(kind = name, preset = ?preset, "strategy configured");
    Ok(strategy)
}

/// Position of a kind in run order: presets first, custom kinds last.
fn preset_rank(name: &str) -> usize {
    EntryKind::from_name(name).map_or(EntryKind::ALL.len(), |kind| kind as usize)
}

/// Explicit list, else the preset class, else the directory-wide classes.
fn class_names(
    explicit: Option<&NameList>,
    preset: Option<&'static str>,
    fallback: &NameList,
) -> Vec<String> {
    match (explicit, preset) {
        (Some(list), _) => list.as_slice().to_vec(),
        (None, Some(class)) => vec![class.to_string()],
        (None, None) => fallback.as_slice().to_vec(),
    }
}
