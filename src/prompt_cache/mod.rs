//! Tiered cache for world-derived prompt data.
//!
//! Prompt builders read the same aggregates many times per simulation tick.
//! [`PromptCacheManager`] keeps each kind of data in the tier whose
//! invalidation trigger matches how it goes stale.

mod events;
mod manager;
mod world;

pub use events::{
    BUILDING_COMPLETE, BUILDING_DESTROYED, EventBus, EventHandler, LocalEventBus, Unsubscribe,
};
pub use manager::{AerialHarmony, Entities, PromptCacheManager, PromptCacheStats, Sector, Tally};
pub use world::{AGENT, BUILDING, EntityId, EntitySnapshot, STORAGE, WorldQuery};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_SECTOR_SIZE: f64 = 16.0;
pub const DEFAULT_HARMONY_TTL_TICKS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCacheConfig {
    /// Edge length of a spatial sector in world units.
    pub sector_size: f64,
    pub harmony_ttl_ticks: u64,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            harmony_ttl_ticks: DEFAULT_HARMONY_TTL_TICKS,
        }
    }
}

impl PromptCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sector_size.is_finite() && self.sector_size > 0.0) {
            return Err(Error::Config(format!(
                "sector_size must be a positive number, got {}",
                self.sector_size
            )));
        }
        Ok(())
    }
}

/// A cached value stamped with the tick it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_tick: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, cached_tick: u64) -> Self {
        Self { data, cached_tick }
    }

    /// Ticks elapsed since caching; zero if `tick` is earlier.
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.cached_tick)
    }
}
