pub mod auth;
pub mod generation;
pub mod orchestrator;
pub mod persistence;
pub mod supabase;
pub mod wizard;

use crate::core::config::Config;
use crate::core::io::Storage;
use anyhow::Result;
use auth::{AuthProvider, LocalAuthProvider};
use log::info;
use persistence::{LocalStoryStore, StoryStore};
use std::sync::Arc;

pub fn create_account_services(
    config: &Config,
    storage: Arc<dyn Storage>,
) -> Result<(Arc<dyn AuthProvider>, Arc<dyn StoryStore>)> {
    match &config.supabase {
        Some(cfg) => {
            info!("Using Supabase at {}", cfg.url);
            let client = Arc::new(supabase::SupabaseClient::new(cfg.clone())?);
            let auth: Arc<dyn AuthProvider> = client.clone();
            let store: Arc<dyn StoryStore> = client;
            Ok((auth, store))
        }
        None => {
            info!("Using local accounts in {}/", config.store_folder);
            let auth: Arc<dyn AuthProvider> =
                Arc::new(LocalAuthProvider::new(storage.clone(), &config.store_folder));
            let store: Arc<dyn StoryStore> =
                Arc::new(LocalStoryStore::new(storage, &config.store_folder));
            Ok((auth, store))
        }
    }
}
