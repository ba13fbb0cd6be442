//! Challenge map selection

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::info;

use super::supabase::SupabaseClient;
use super::{MapSource, StoreError};
use crate::game::{Map, Position, Size, Tile, TileType};

/// Map row as stored in the `maps` table, tiles in a JSON column
#[derive(Debug, Clone, Deserialize)]
pub struct MapRow {
    pub id: i64,
    pub map_name: String,
    pub width: i32,
    pub height: i32,
    pub max_robot_fuel: u32,
    #[serde(default)]
    pub solar_charge_rate: f64,
    pub tiles: Vec<TileRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TileRow {
    pub x: i32,
    pub y: i32,
    pub height: i32,
    #[serde(rename = "type")]
    pub tile_type: TileType,
}

impl TryFrom<MapRow> for Map {
    type Error = StoreError;

    fn try_from(row: MapRow) -> Result<Self, Self::Error> {
        let tiles = row
            .tiles
            .into_iter()
            .map(|t| Tile::new(Position::new(t.x, t.y), t.height, t.tile_type))
            .collect();

        Map::new(
            row.id,
            row.map_name,
            Size::new(row.width, row.height),
            tiles,
            row.max_robot_fuel,
            row.solar_charge_rate,
        )
        .map_err(|source| StoreError::InvalidMap { id: row.id, source })
    }
}

/// Picks the next map among the active rows of the `maps` table
#[derive(Clone)]
pub struct SupabaseMapSource {
    client: SupabaseClient,
}

impl SupabaseMapSource {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn fetch_random_active(&self) -> Result<Map, StoreError> {
        let rows: Vec<MapRow> = self.client.get("maps", "select=*&active=eq.true").await?;
        let row = rows
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(StoreError::NoActiveMap)?;

        info!(map_id = row.id, map_name = %row.map_name, candidates = rows.len(), "Selected next map");
        Map::try_from(row)
    }
}

impl MapSource for SupabaseMapSource {
    fn next_challenge_map(&self) -> BoxFuture<'_, Result<Map, StoreError>> {
        Box::pin(self.fetch_random_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MapError;

    fn row(tiles: serde_json::Value) -> MapRow {
        serde_json::from_value(serde_json::json!({
            "id": 4,
            "map_name": "valley",
            "width": 2,
            "height": 1,
            "max_robot_fuel": 120,
            "tiles": tiles,
        }))
        .unwrap()
    }

    #[test]
    fn row_converts_to_map() {
        let map = Map::try_from(row(serde_json::json!([
            {"x": 0, "y": 0, "height": 0, "type": "start"},
            {"x": 1, "y": 0, "height": 5, "type": "target"},
        ])))
        .unwrap();

        assert_eq!(map.id, 4);
        assert_eq!(map.max_robot_fuel, 120);
        assert_eq!(map.solar_charge_rate, 0.0);
        assert_eq!(map.target_position(), Position::new(1, 0));
        assert_eq!(map.start_positions(), &[Position::new(0, 0)]);
    }

    #[test]
    fn invalid_row_is_reported_with_its_id() {
        let result = Map::try_from(row(serde_json::json!([
            {"x": 0, "y": 0, "height": 0, "type": "start"},
            {"x": 1, "y": 0, "height": 5, "type": "default"},
        ])));

        match result {
            Err(StoreError::InvalidMap { id, source }) => {
                assert_eq!(id, 4);
                assert_eq!(source, MapError::TargetCount(0));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
