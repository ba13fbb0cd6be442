//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameHandler;
use crate::settings::SettingsStore;
use crate::store::{Stores, SupabaseClient};
use crate::util::rate_limit::ActionRateLimiter;
use crate::ws::ChannelBroadcaster;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub game: Arc<GameHandler>,
    pub action_limiter: Arc<ActionRateLimiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Every collaborator talks to the same Supabase project
        let stores = Stores::supabase(SupabaseClient::new(&config));

        let broadcaster = Arc::new(ChannelBroadcaster::new());
        let settings = Arc::new(SettingsStore::new(&config.game));

        let game = Arc::new(GameHandler::new(
            settings,
            stores.clone(),
            broadcaster.clone(),
            config.tile_scan_cost,
        ));

        let action_limiter = Arc::new(ActionRateLimiter::new(config.action_rate_limit));

        Self {
            config,
            stores,
            broadcaster,
            game,
            action_limiter,
        }
    }
}
