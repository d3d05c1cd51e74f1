//! Shop reads through the cache and write-around updates.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::cache::{CacheCoordinator, CacheError};
use crate::domain::ports::{CacheKey, ShopRepository, ShopRepositoryError};
use crate::domain::{Shop, ShopId};

/// Cache namespace for shops.
pub const SHOP_CACHE_PREFIX: &str = "cache:shop:";

/// Read policy used by [`ShopCatalogue::query_by_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShopCachePolicy {
    /// Empty-sentinel penetration guard only.
    PassThrough,
    /// Per-key rebuild lock on misses.
    Mutex,
    /// Pre-warmed entries with background refresh. Shops must be warmed with
    /// [`ShopCatalogue::warm_up`] before they can be read; updates re-warm.
    #[default]
    LogicalExpiry,
}

/// Errors raised by the shop catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShopCatalogueError {
    /// No such shop (or, under logical expiry, not warmed).
    #[error("shop {id} not found")]
    NotFound { id: ShopId },
    /// The cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The system of record failed.
    #[error(transparent)]
    Repository(#[from] ShopRepositoryError),
}

/// Cached shop catalogue.
#[derive(Clone)]
pub struct ShopCatalogue {
    repository: Arc<dyn ShopRepository>,
    cache: CacheCoordinator,
    policy: ShopCachePolicy,
}

impl ShopCatalogue {
    pub fn new(
        repository: Arc<dyn ShopRepository>,
        cache: CacheCoordinator,
        policy: ShopCachePolicy,
    ) -> Self {
        Self {
            repository,
            cache,
            policy,
        }
    }

    /// Read a shop through the cache.
    pub async fn query_by_id(&self, id: ShopId) -> Result<Shop, ShopCatalogueError> {
        let key = shop_key(id)?;
        let repository = self.repository.clone();
        let loader = move || async move { repository.find_by_id(id).await };
        let config = self.cache.config();

        let shop = match self.policy {
            ShopCachePolicy::PassThrough => {
                self.cache.get_or_load(&key, config.ttls(), loader).await?
            }
            ShopCachePolicy::Mutex => self.cache.get_with_lock(&key, config.ttls(), loader).await?,
            ShopCachePolicy::LogicalExpiry => {
                self.cache
                    .get_with_logical_expiry(&key, config.logical_ttl, loader)
                    .await?
            }
        };
        shop.ok_or(ShopCatalogueError::NotFound { id })
    }

    /// Write `shop` to the system of record, then drop its cache entry.
    ///
    /// Logical-expiry reads never load a missing key, so under that policy
    /// the written shop is warmed back in after the invalidation. A failed
    /// re-warm is logged and leaves the key cold until [`Self::warm_up`].
    pub async fn update(&self, shop: &Shop) -> Result<(), ShopCatalogueError> {
        if !self.repository.update(shop).await? {
            return Err(ShopCatalogueError::NotFound { id: shop.id });
        }
        let key = shop_key(shop.id)?;
        self.cache.invalidate(&key).await?;
        info!(shop_id = %shop.id, "shop updated; cache entry invalidated");

        if self.policy == ShopCachePolicy::LogicalExpiry {
            if let Err(err) = self
                .cache
                .set_with_logical_expiry(&key, shop, self.cache.config().logical_ttl)
                .await
            {
                warn!(shop_id = %shop.id, error = %err, "re-warming updated shop failed");
            }
        }
        Ok(())
    }

    /// Load a shop and cache it in a logical-expiry envelope.
    pub async fn warm_up(&self, id: ShopId) -> Result<(), ShopCatalogueError> {
        let shop = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ShopCatalogueError::NotFound { id })?;
        let key = shop_key(id)?;
        self.cache
            .set_with_logical_expiry(&key, &shop, self.cache.config().logical_ttl)
            .await?;
        debug!(shop_id = %id, "shop cache warmed");
        Ok(())
    }
}

fn shop_key(id: ShopId) -> Result<CacheKey, CacheError> {
    CacheKey::for_entity(SHOP_CACHE_PREFIX, id).map_err(|err| CacheError::Encode {
        key: format!("{SHOP_CACHE_PREFIX}{id}"),
        message: err.to_string(),
    })
}
