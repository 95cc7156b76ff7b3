//! Shared content tables.
//!
//! The [`ContentRegistry`] is an arena owned by the runtime plugin set.
//! Plugins register definitions while loading and get back an opaque
//! [`ContentId`]; the tables are sized once by [`ContentRegistry::seal`]
//! before content setup begins, after which only properties may change.
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugin_system::manifest::RunMode;
use crate::plugin_system::traits::LifecyclePhase;

/// Kinds of content a plugin can add
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Item,
    Tile,
    Wall,
    Projectile,
    Npc,
    Buff,
    Sound,
}

impl ContentKind {
    pub const ALL: [ContentKind; 7] = [
        ContentKind::Item,
        ContentKind::Tile,
        ContentKind::Wall,
        ContentKind::Projectile,
        ContentKind::Npc,
        ContentKind::Buff,
        ContentKind::Sound,
    ];
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Item => "item",
            ContentKind::Tile => "tile",
            ContentKind::Wall => "wall",
            ContentKind::Projectile => "projectile",
            ContentKind::Npc => "npc",
            ContentKind::Buff => "buff",
            ContentKind::Sound => "sound",
        };
        f.write_str(name)
    }
}

/// Number of built-in host entries per kind. Plugin IDs start after these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VanillaContent {
    pub item: u32,
    pub tile: u32,
    pub wall: u32,
    pub projectile: u32,
    pub npc: u32,
    pub buff: u32,
    pub sound: u32,
}

impl VanillaContent {
    pub fn count(&self, kind: ContentKind) -> u32 {
        match kind {
            ContentKind::Item => self.item,
            ContentKind::Tile => self.tile,
            ContentKind::Wall => self.wall,
            ContentKind::Projectile => self.projectile,
            ContentKind::Npc => self.npc,
            ContentKind::Buff => self.buff,
            ContentKind::Sound => self.sound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("Content registration is closed during {0}")]
    RegistrationClosed(LifecyclePhase),

    #[error("Content tables have not been sized yet")]
    NotSealed,

    #[error("Content name must not be empty or contain '/': '{0}'")]
    InvalidName(String),

    #[error("{kind} '{qualified}' is already registered")]
    Duplicate { kind: ContentKind, qualified: String },

    #[error("Unknown content id {0}")]
    UnknownId(ContentId),

    #[error("Plugin '{caller}' cannot modify {id} owned by '{owner}'")]
    NotOwner { caller: String, owner: String, id: ContentId },

    #[error("Hot key '{0}' is already registered")]
    DuplicateHotKey(String),
}

/// Opaque handle to a content entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId {
    kind: ContentKind,
    index: u32,
}

impl ContentId {
    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// Numeric type id as seen by the host
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.index)
    }
}

/// A plugin-registered content definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    owner: String,
    name: String,
    properties: BTreeMap<String, String>,
}

impl ContentEntry {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Owner/Name`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

#[derive(Debug, Default)]
struct ContentTable {
    entries: Vec<ContentEntry>,
    by_name: HashMap<String, usize>,
    size: u32,
}

/// Arena of every content table
#[derive(Debug)]
pub struct ContentRegistry {
    vanilla: VanillaContent,
    tables: BTreeMap<ContentKind, ContentTable>,
    sealed: bool,
}

impl ContentRegistry {
    pub fn new(vanilla: VanillaContent) -> Self {
        let mut registry = Self {
            vanilla,
            tables: BTreeMap::new(),
            sealed: false,
        };
        registry.clear();
        registry
    }

    /// Adds a definition and hands back its stable id.
    pub fn register(&mut self, kind: ContentKind, owner: &str, name: &str) -> Result<ContentId, ContentError> {
        if self.sealed {
            return Err(ContentError::RegistrationClosed(LifecyclePhase::SetupContent));
        }
        if name.is_empty() || name.contains('/') {
            return Err(ContentError::InvalidName(name.to_string()));
        }

        let base = self.vanilla.count(kind);
        let table = self.tables.entry(kind).or_default();
        let qualified = format!("{}/{}", owner, name);
        if table.by_name.contains_key(&qualified) {
            return Err(ContentError::Duplicate { kind, qualified });
        }

        let slot = table.entries.len();
        table.entries.push(ContentEntry {
            owner: owner.to_string(),
            name: name.to_string(),
            properties: BTreeMap::new(),
        });
        table.by_name.insert(qualified, slot);

        Ok(ContentId {
            kind,
            index: base + slot as u32,
        })
    }

    /// Sizes every table to vanilla plus registered entries and closes registration.
    pub fn seal(&mut self) {
        for kind in ContentKind::ALL {
            let base = self.vanilla.count(kind);
            let table = self.tables.entry(kind).or_default();
            table.size = base + table.entries.len() as u32;
        }
        self.sealed = true;
        log::debug!(
            "Content tables sized: {}",
            ContentKind::ALL
                .iter()
                .map(|k| format!("{}={}", k, self.size(*k)))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Table size including vanilla entries
    pub fn size(&self, kind: ContentKind) -> u32 {
        self.tables.get(&kind).map(|t| t.size).unwrap_or_else(|| self.vanilla.count(kind))
    }

    /// Number of plugin-registered entries of a kind
    pub fn registered(&self, kind: ContentKind) -> usize {
        self.tables.get(&kind).map(|t| t.entries.len()).unwrap_or(0)
    }

    pub fn get(&self, id: ContentId) -> Option<&ContentEntry> {
        let slot = id.index.checked_sub(self.vanilla.count(id.kind))? as usize;
        self.tables.get(&id.kind)?.entries.get(slot)
    }

    /// Looks up `Owner/Name`
    pub fn find(&self, kind: ContentKind, qualified: &str) -> Option<ContentId> {
        let table = self.tables.get(&kind)?;
        let slot = *table.by_name.get(qualified)?;
        Some(ContentId {
            kind,
            index: self.vanilla.count(kind) + slot as u32,
        })
    }

    /// Sets a property on one of the caller's own entries after sizing.
    pub fn set_property(&mut self, caller: &str, id: ContentId, key: &str, value: &str) -> Result<(), ContentError> {
        if !self.sealed {
            return Err(ContentError::NotSealed);
        }
        let slot = id
            .index
            .checked_sub(self.vanilla.count(id.kind))
            .ok_or(ContentError::NotOwner {
                caller: caller.to_string(),
                owner: "vanilla".to_string(),
                id,
            })? as usize;
        let entry = self
            .tables
            .get_mut(&id.kind)
            .and_then(|t| t.entries.get_mut(slot))
            .ok_or(ContentError::UnknownId(id))?;
        if entry.owner != caller {
            return Err(ContentError::NotOwner {
                caller: caller.to_string(),
                owner: entry.owner.clone(),
                id,
            });
        }
        entry.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Entries owned by one plugin, in registration order
    pub fn owned_by(&self, owner: &str) -> Vec<ContentId> {
        let mut ids = Vec::new();
        for (kind, table) in &self.tables {
            let base = self.vanilla.count(*kind);
            for (slot, entry) in table.entries.iter().enumerate() {
                if entry.owner == owner {
                    ids.push(ContentId {
                        kind: *kind,
                        index: base + slot as u32,
                    });
                }
            }
        }
        ids
    }

    /// Drops every plugin entry and shrinks tables back to vanilla size.
    pub fn clear(&mut self) {
        self.tables.clear();
        for kind in ContentKind::ALL {
            self.tables.insert(
                kind,
                ContentTable {
                    size: self.vanilla.count(kind),
                    ..ContentTable::default()
                },
            );
        }
        self.sealed = false;
    }
}

/// A key binding a plugin asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotKey {
    pub owner: String,
    pub name: String,
    pub default_key: String,
}

impl HotKey {
    pub fn qualified_name(&self) -> String {
        format!("{}: {}", self.owner, self.name)
    }
}

/// Hot keys keyed by `Owner: Name`, kept in registration order
#[derive(Debug, Default)]
pub struct HotKeyRegistry {
    keys: Vec<HotKey>,
    index: HashMap<String, usize>,
}

impl HotKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: &str, name: &str, default_key: &str) -> Result<(), ContentError> {
        let key = HotKey {
            owner: owner.to_string(),
            name: name.to_string(),
            default_key: default_key.to_string(),
        };
        let qualified = key.qualified_name();
        if self.index.contains_key(&qualified) {
            return Err(ContentError::DuplicateHotKey(qualified));
        }
        self.index.insert(qualified, self.keys.len());
        self.keys.push(key);
        Ok(())
    }

    pub fn get(&self, qualified: &str) -> Option<&HotKey> {
        self.index.get(qualified).map(|&i| &self.keys[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &HotKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.index.clear();
    }
}

/// One crafting recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub owner: String,
    pub result: ContentId,
    pub amount: u32,
    pub ingredients: Vec<(ContentId, u32)>,
}

/// Recipes rebuilt at the end of every load
#[derive(Debug, Default)]
pub struct RecipeTable {
    recipes: Vec<Recipe>,
}

impl RecipeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn clear(&mut self) {
        self.recipes.clear();
    }
}

/// Recipe registration handle given to the `add_recipes` hook
pub struct RecipeBuilder<'a> {
    owner: &'a str,
    content: &'a ContentRegistry,
    table: &'a mut RecipeTable,
}

impl<'a> RecipeBuilder<'a> {
    pub(crate) fn new(owner: &'a str, content: &'a ContentRegistry, table: &'a mut RecipeTable) -> Self {
        Self { owner, content, table }
    }

    pub fn owner(&self) -> &str {
        self.owner
    }

    /// Resolves `Owner/Name` item references
    pub fn item(&self, qualified: &str) -> Option<ContentId> {
        self.content.find(ContentKind::Item, qualified)
    }

    pub fn add(&mut self, result: ContentId, amount: u32, ingredients: Vec<(ContentId, u32)>) -> Result<(), ContentError> {
        for id in std::iter::once(&result).chain(ingredients.iter().map(|(id, _)| id)) {
            if id.index >= self.content.size(id.kind) {
                return Err(ContentError::UnknownId(*id));
            }
        }
        self.table.recipes.push(Recipe {
            owner: self.owner.to_string(),
            result,
            amount,
            ingredients,
        });
        Ok(())
    }
}

/// What a plugin hook may touch while it runs
pub struct PluginContext<'a> {
    owner: &'a str,
    phase: LifecyclePhase,
    run_mode: RunMode,
    content: &'a mut ContentRegistry,
    hot_keys: &'a mut HotKeyRegistry,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(
        owner: &'a str,
        phase: LifecyclePhase,
        run_mode: RunMode,
        content: &'a mut ContentRegistry,
        hot_keys: &'a mut HotKeyRegistry,
    ) -> Self {
        Self {
            owner,
            phase,
            run_mode,
            content,
            hot_keys,
        }
    }

    /// Name of the plugin whose hook is running
    pub fn owner(&self) -> &str {
        self.owner
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Register a content definition. Only allowed while loading.
    pub fn register_content(&mut self, kind: ContentKind, name: &str) -> Result<ContentId, ContentError> {
        if self.phase != LifecyclePhase::Load {
            return Err(ContentError::RegistrationClosed(self.phase));
        }
        self.content.register(kind, self.owner, name)
    }

    /// Register a hot key. Only allowed while loading.
    pub fn register_hot_key(&mut self, name: &str, default_key: &str) -> Result<(), ContentError> {
        if self.phase != LifecyclePhase::Load {
            return Err(ContentError::RegistrationClosed(self.phase));
        }
        self.hot_keys.register(self.owner, name, default_key)
    }

    /// Set a property on one of this plugin's own entries
    pub fn set_property(&mut self, id: ContentId, key: &str, value: &str) -> Result<(), ContentError> {
        self.content.set_property(self.owner, id, key, value)
    }

    pub fn find(&self, kind: ContentKind, qualified: &str) -> Option<ContentId> {
        self.content.find(kind, qualified)
    }

    pub fn entry(&self, id: ContentId) -> Option<&ContentEntry> {
        self.content.get(id)
    }

    /// Current table size for a kind
    pub fn table_size(&self, kind: ContentKind) -> u32 {
        self.content.size(kind)
    }
}
