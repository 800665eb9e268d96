//! Read-only game tables consulted by the room.
//!
//! Tables are loaded once at startup from a content directory whose
//! `config.json` names the remaining files. Nothing is re-read at runtime.

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared::{
    CharacterInfo, GameConfig, ItemInfo, MapInfo, SpriteAtlasInfo, StatTypeInfo, ITEM_SLOT_COUNT,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Lookup interface over the static tables.
pub trait ContentProvider: Send + Sync {
    fn config(&self) -> &GameConfig;
    fn character(&self, index: i32) -> Option<&CharacterInfo>;
    fn item(&self, index: i32) -> Option<&ItemInfo>;
    fn map(&self, index: i32) -> Option<&MapInfo>;
}

#[derive(Deserialize)]
struct CharacterTable {
    #[serde(default)]
    character_list: Vec<CharacterInfo>,
}

#[derive(Deserialize)]
struct ItemTable {
    #[serde(default)]
    item_list: Vec<ItemInfo>,
}

#[derive(Deserialize)]
struct StatTypeTable {
    #[serde(default)]
    stat_type_list: Vec<StatTypeInfo>,
}

/// In-memory tables keyed the way the room looks them up.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    config: GameConfig,
    characters: BTreeMap<i32, CharacterInfo>,
    items: BTreeMap<i32, ItemInfo>,
    maps: BTreeMap<i32, MapInfo>,
    stat_types: BTreeMap<String, StatTypeInfo>,
    sprite_atlases: BTreeMap<String, SpriteAtlasInfo>,
}

impl ContentStore {
    pub fn from_tables(
        config: GameConfig,
        characters: Vec<CharacterInfo>,
        items: Vec<ItemInfo>,
        maps: Vec<MapInfo>,
    ) -> Self {
        Self {
            config,
            characters: characters.into_iter().map(|c| (c.index, c)).collect(),
            items: items.into_iter().map(|i| (i.index, i)).collect(),
            maps: maps.into_iter().map(|m| (m.index, m)).collect(),
            ..Self::default()
        }
    }

    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ContentError> {
        let dir = dir.as_ref();
        let config: GameConfig = read_json(&dir.join(CONFIG_FILE))?;

        let characters: CharacterTable = read_json(&dir.join(&config.character_file))?;
        let items: ItemTable = read_json(&dir.join(&config.item_file))?;

        let mut maps = Vec::with_capacity(config.map_files.len());
        for file in &config.map_files {
            maps.push(read_json::<MapInfo>(&dir.join(file))?);
        }

        let mut store = Self::from_tables(
            config.clone(),
            characters.character_list,
            items.item_list,
            maps,
        );

        if !config.stat_file.is_empty() {
            let stat_types: StatTypeTable = read_json(&dir.join(&config.stat_file))?;
            store.stat_types = stat_types
                .stat_type_list
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect();
        }

        for file in &config.sprite_atlas_files {
            let atlas: SpriteAtlasInfo = read_json(&dir.join(file))?;
            store.sprite_atlases.insert(atlas.file_name.clone(), atlas);
        }

        if config.selectable_item_count != ITEM_SLOT_COUNT as i32 {
            warn!(
                "Config selects {} item slots, the room always uses {}",
                config.selectable_item_count, ITEM_SLOT_COUNT
            );
        }

        info!(
            "Loaded content from {}: {} characters, {} items, {} maps",
            dir.display(),
            store.characters.len(),
            store.items.len(),
            store.maps.len()
        );
        Ok(store)
    }

    pub fn stat_type(&self, name: &str) -> Option<&StatTypeInfo> {
        self.stat_types.get(name)
    }

    pub fn sprite_atlas(&self, file_name: &str) -> Option<&SpriteAtlasInfo> {
        self.sprite_atlases.get(file_name)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }
}

impl ContentProvider for ContentStore {
    fn config(&self) -> &GameConfig {
        &self.config
    }

    fn character(&self, index: i32) -> Option<&CharacterInfo> {
        self.characters.get(&index)
    }

    fn item(&self, index: i32) -> Option<&ItemInfo> {
        self.items.get(&index)
    }

    fn map(&self, index: i32) -> Option<&MapInfo> {
        self.maps.get(&index)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ContentError> {
    let text = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ContentError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
