//! Static game tables: characters, items, maps and the config that names them.
//!
//! Field names follow the JSON the content tables are authored in. Missing
//! fields fall back to defaults so partially filled rows still load.

use serde::{Deserialize, Serialize};

/// Which stat an item modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatType {
    Hp,
    Speed,
    Dex,
    Def,
}

impl TryFrom<i32> for StatType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatType::Hp),
            1 => Ok(StatType::Speed),
            2 => Ok(StatType::Dex),
            3 => Ok(StatType::Def),
            other => Err(other),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    #[serde(rename = "map_file_list")]
    pub map_files: Vec<String>,
    pub character_file: String,
    pub item_file: String,
    pub stat_file: String,
    #[serde(rename = "sprite_atlas_file_list")]
    pub sprite_atlas_files: Vec<String>,
    pub selectable_item_count: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CharacterInfo {
    pub index: i32,
    pub name: String,
    pub color_name: String,
    pub speed: f32,
    pub hp: f32,
    pub dex: f32,
    pub def: f32,
    pub stun_duration: f32,
    pub image_sequence_name: String,
    pub size_x: f32,
    pub size_y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ItemInfo {
    pub index: i32,
    pub name: String,
    pub stat_type: i32,
    pub add_value: f32,
    pub desc: String,
}

impl ItemInfo {
    pub fn stat(&self) -> Option<StatType> {
        StatType::try_from(self.stat_type).ok()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StatTypeInfo {
    pub index: i32,
    #[serde(rename = "type")]
    pub stat_type: i32,
    pub name: String,
}

/// One segment of a map's lane: its vertical opening and what sits in it.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LaneNode {
    pub top_y_pos: f32,
    pub bottom_y_pos: f32,
    pub item_type: i32,
    pub obstacle_type: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MapInfo {
    pub index: i32,
    pub name: String,
    pub difficulty_color_name: String,
    pub difficulty_rate: f32,
    pub collision_damage: f32,
    #[serde(rename = "line_node_list")]
    pub lane_nodes: Vec<LaneNode>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SpriteSheetInfo {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub pivot_x: f32,
    pub pivot_y: f32,
}

/// Cosmetic sprite atlas; carried for clients, never read by the simulation.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SpriteAtlasInfo {
    pub file_name: String,
    pub prefix: String,
    pub size_x: f32,
    pub size_y: f32,
    pub sprites: Vec<SpriteSheetInfo>,
}
