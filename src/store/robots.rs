//! Robot lookup

use futures::future::BoxFuture;
use serde::Deserialize;
use uuid::Uuid;

use super::supabase::SupabaseClient;
use super::{RobotDirectory, StoreError};
use crate::game::{Color, RobotId, RobotInfo, UserRef};

/// Columns selected from `robots`, with the owner embedded from `profiles`
const ROBOT_SELECT: &str = "select=id,name,color,owner:profiles(id,username)";

/// Robot row with embedded owner
#[derive(Debug, Clone, Deserialize)]
pub struct RobotRow {
    pub id: RobotId,
    pub name: String,
    pub color: Color,
    pub owner: UserRef,
}

impl From<RobotRow> for RobotInfo {
    fn from(row: RobotRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            color: row.color,
        }
    }
}

#[derive(Clone)]
pub struct SupabaseRobotDirectory {
    client: SupabaseClient,
}

impl SupabaseRobotDirectory {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, filter: String) -> Result<Option<RobotInfo>, StoreError> {
        let query = format!("{}&{}", ROBOT_SELECT, filter);
        let row: Option<RobotRow> = self.client.get_one("robots", &query).await?;
        Ok(row.map(RobotInfo::from))
    }
}

impl RobotDirectory for SupabaseRobotDirectory {
    fn robot(&self, robot_id: RobotId) -> BoxFuture<'_, Result<Option<RobotInfo>, StoreError>> {
        Box::pin(self.fetch(format!("id=eq.{}", robot_id)))
    }

    fn robot_for_user(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<RobotInfo>, StoreError>> {
        Box::pin(self.fetch(format!("user_id=eq.{}", user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_with_embedded_owner_parses() {
        let owner = Uuid::new_v4();
        let row: RobotRow = serde_json::from_value(serde_json::json!({
            "id": 12,
            "name": "Rover",
            "color": {"r": 255, "g": 0, "b": 10},
            "owner": {"id": owner, "username": "ada"},
        }))
        .unwrap();

        let info = RobotInfo::from(row);
        assert_eq!(info.id, 12);
        assert_eq!(info.owner.id, owner);
        assert_eq!(info.owner.username, "ada");
        assert_eq!(info.color, Color { r: 255, g: 0, b: 10 });
    }
}
