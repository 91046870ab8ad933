use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, trace};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cache::LoadingCache;
use crate::config::RepositoryConfig;
use crate::images::{resolve, FetchError, SkinFetcher};
use crate::models::{Image, Outcome};

/// Default skin shipped with the service.
pub const DEFAULT_SKIN_PNG: &[u8] = include_bytes!("../../resources/char.png");

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Can't load default skin: {0}")]
    DefaultSkin(#[from] image::ImageError),

    #[error("Can't build fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

/// Looks up skins and capes by username, caching every outcome.
pub struct SkinRepository {
    skins: LoadingCache<Outcome>,
    capes: LoadingCache<Outcome>,
    default_skin: Arc<Image>,
}

impl SkinRepository {
    /// Build a repository using the bundled default skin.
    pub fn new(config: &RepositoryConfig) -> Result<Self, RepositoryError> {
        Self::with_default_skin(config, DEFAULT_SKIN_PNG)
    }

    /// Build a repository whose fallback skin is decoded from `default_skin`.
    pub fn with_default_skin(
        config: &RepositoryConfig,
        default_skin: &[u8],
    ) -> Result<Self, RepositoryError> {
        let default_skin = Arc::new(Image::decode(default_skin)?);

        let fetcher = Arc::new(SkinFetcher::new(
            config.access,
            config.format,
            config.fetch_timeout(),
        )?);

        let mut skins = Self::cache(config, Arc::clone(&fetcher), config.skin_path.clone());
        let mut capes = Self::cache(config, fetcher, config.cape_path.clone());
        if let Some(max_entries) = config.cache_max_entries {
            skins = skins.with_max_entries(max_entries);
            capes = capes.with_max_entries(max_entries);
        }

        info!(
            "Skin repository ready ({:?} access, {:?} format, {} min expiry)",
            config.access, config.format, config.cache_expire_minutes
        );

        Ok(Self {
            skins,
            capes,
            default_skin,
        })
    }

    fn cache(
        config: &RepositoryConfig,
        fetcher: Arc<SkinFetcher>,
        template: String,
    ) -> LoadingCache<Outcome> {
        LoadingCache::new(config.cache_expiry(), move |username: &str| {
            let fetcher = Arc::clone(&fetcher);
            let locator = resolve(&template, username);
            async move { Outcome::from(fetcher.fetch(&locator).await) }
        })
    }

    /// Skin for `username`. When none exists, `or_default` decides between
    /// the default skin and `None`.
    pub async fn get_skin(&self, username: &str, or_default: bool) -> Option<Arc<Image>> {
        match self.skins.get(username).await {
            Outcome::Present(img) => Some(img),
            Outcome::Absent if or_default => Some(Arc::clone(&self.default_skin)),
            Outcome::Absent => None,
        }
    }

    pub async fn get_cape(&self, username: &str) -> Option<Arc<Image>> {
        self.capes.get(username).await.into_image()
    }

    pub fn invalidate_skin(&self, username: &str) {
        trace!("Skin of player {} purged", username);
        self.skins.invalidate(username);
    }

    pub fn invalidate_cape(&self, username: &str) {
        trace!("Cape of player {} purged", username);
        self.capes.invalidate(username);
    }

    pub fn default_skin(&self) -> &Arc<Image> {
        &self.default_skin
    }

    pub fn cache_expiry(&self) -> Duration {
        self.skins.expire_after_access()
    }

    /// Drop idle entries from both caches.
    pub fn purge_expired(&self) -> usize {
        let purged = self.skins.purge_expired() + self.capes.purge_expired();
        if purged > 0 {
            debug!(
                "Purged {} expired skin/cape entries, {} left",
                purged,
                self.skins.entry_count() + self.capes.entry_count()
            );
        }
        purged
    }

    /// Sweep expired entries every `period` until the repository is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let repository: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match repository.upgrade() {
                    Some(repository) => {
                        repository.purge_expired();
                    }
                    None => break,
                }
            }
        })
    }
}
