//! Game setting overrides

use futures::future::BoxFuture;
use serde::Deserialize;

use super::supabase::SupabaseClient;
use super::{SettingsSource, StoreError};

/// Row of the `settings` table
#[derive(Debug, Clone, Deserialize)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
}

#[derive(Clone)]
pub struct SupabaseSettingsSource {
    client: SupabaseClient,
}

impl SupabaseSettingsSource {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn fetch_all(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows: Vec<SettingRow> = self.client.get("settings", "select=key,value").await?;
        Ok(rows.into_iter().map(|r| (r.key, r.value)).collect())
    }
}

impl SettingsSource for SupabaseSettingsSource {
    fn load_settings(&self) -> BoxFuture<'_, Result<Vec<(String, String)>, StoreError>> {
        Box::pin(self.fetch_all())
    }
}
