use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::events::{BUILDING_COMPLETE, BUILDING_DESTROYED, EventBus, EventHandler, Unsubscribe};
use super::world::{AGENT, BUILDING, EntitySnapshot, STORAGE, WorldQuery};
use super::{CacheEntry, PromptCacheConfig};
use crate::observability::Counter;
use crate::{Error, Result};

pub type Sector = (i64, i64);
pub type Entities = Arc<Vec<EntitySnapshot>>;
pub type Tally = Arc<HashMap<String, u64>>;

/// Layout analysis of one sector as seen from above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AerialHarmony {
    pub score: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptCacheStats {
    pub static_tables: usize,
    pub village_aggregates: usize,
    pub frame_entries: usize,
    pub frame_tick: Option<u64>,
    pub harmony_sectors: usize,
    pub hits: u64,
    pub misses: u64,
}

impl PromptCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct VillageAggregates {
    /// Bumped on every invalidation so a tally computed across one is dropped.
    generation: u64,
    building_counts: Option<Tally>,
    storage_totals: Option<Tally>,
    agents_by_behavior: Option<Tally>,
    agents_by_skill: Option<Tally>,
}

impl VillageAggregates {
    fn invalidate(&mut self) {
        *self = Self {
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
    }

    fn occupancy(&self) -> usize {
        [
            &self.building_counts,
            &self.storage_totals,
            &self.agents_by_behavior,
            &self.agents_by_skill,
        ]
        .iter()
        .filter(|slot| slot.is_some())
        .count()
    }
}

#[derive(Debug, Default)]
struct FrameCache {
    tick: Option<u64>,
    all_buildings: Option<Entities>,
    all_agents: Option<Entities>,
    storage_buildings: Option<Entities>,
    buildings_by_type: HashMap<String, Entities>,
}

impl FrameCache {
    fn occupancy(&self) -> usize {
        [
            &self.all_buildings,
            &self.all_agents,
            &self.storage_buildings,
        ]
        .iter()
        .filter(|slot| slot.is_some())
        .count()
            + self.buildings_by_type.len()
    }
}

type StaticTable = Arc<dyn Any + Send + Sync>;

/// Four-tier cache of world-derived data consumed by prompt builders.
///
/// | Tier | Contents | Cleared by |
/// |---|---|---|
/// | static | lookup tables | [`clear_all`](Self::clear_all) only |
/// | village | aggregate tallies | `building:complete` / `building:destroyed` |
/// | frame | raw world queries | [`start_frame`](Self::start_frame) with a new tick |
/// | spatial | per-sector harmony | tick TTL or [`invalidate_aerial_harmony_at`](Self::invalidate_aerial_harmony_at) |
///
/// Owned by the simulation root; call [`initialize`](Self::initialize) once
/// an event bus exists and [`dispose`](Self::dispose) on shutdown.
pub struct PromptCacheManager {
    config: PromptCacheConfig,
    world: Arc<dyn WorldQuery>,
    static_tables: RwLock<HashMap<String, StaticTable>>,
    village: Arc<Mutex<VillageAggregates>>,
    frame: Mutex<FrameCache>,
    harmony: Mutex<HashMap<Sector, CacheEntry<AerialHarmony>>>,
    subscriptions: Mutex<Vec<Unsubscribe>>,
    hits: Counter,
    misses: Counter,
}

impl PromptCacheManager {
    pub fn new(world: Arc<dyn WorldQuery>) -> Self {
        Self::with_config(world, PromptCacheConfig::default())
    }

    pub fn with_config(world: Arc<dyn WorldQuery>, config: PromptCacheConfig) -> Self {
        Self {
            config,
            world,
            static_tables: RwLock::new(HashMap::new()),
            village: Arc::new(Mutex::new(VillageAggregates::default())),
            frame: Mutex::new(FrameCache::default()),
            harmony: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            hits: Counter::new(),
            misses: Counter::new(),
        }
    }

    pub fn config(&self) -> &PromptCacheConfig {
        &self.config
    }

    /// Subscribes village invalidation to `bus`. Calling it again replaces
    /// the previous subscriptions.
    pub fn initialize(&self, bus: &dyn EventBus) {
        self.dispose();
        let handles: Vec<Unsubscribe> = [BUILDING_COMPLETE, BUILDING_DESTROYED]
            .into_iter()
            .map(|event| {
                let village = Arc::clone(&self.village);
                let handler: EventHandler = Arc::new(move |_: &serde_json::Value| {
                    village
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .invalidate();
                    tracing::debug!(event, "village aggregates invalidated");
                });
                bus.on(event, handler)
            })
            .collect();
        *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()) = handles;
    }

    pub fn dispose(&self) {
        let handles =
            std::mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            handle.unsubscribe();
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    fn hit(&self, tier: &'static str) {
        self.hits.inc();
        tracing::trace!(tier, "prompt cache hit");
    }

    fn miss(&self, tier: &'static str) {
        self.misses.inc();
        tracing::trace!(tier, "prompt cache miss");
    }

    // Tier 1

    /// Table `name`, built by `init` on first use. Fails if `name` was
    /// built with a different type.
    pub fn static_table<T, F>(&self, name: &str, init: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let existing = self
            .static_tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        if let Some(table) = existing {
            self.hit("static");
            return Self::downcast_table(name, table);
        }

        self.miss("static");
        let built: StaticTable = Arc::new(init());
        let table = self
            .static_tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert(built)
            .clone();
        Self::downcast_table(name, table)
    }

    fn downcast_table<T: Any + Send + Sync>(name: &str, table: StaticTable) -> Result<Arc<T>> {
        table.downcast::<T>().map_err(|_| {
            Error::Validation(format!(
                "static table '{name}' holds a different type than {}",
                std::any::type_name::<T>()
            ))
        })
    }

    // Tier 2

    /// Aggregates read the world directly, never the frame tier.
    fn village_tally(
        &self,
        slot: fn(&mut VillageAggregates) -> &mut Option<Tally>,
        tags: &[&str],
        compute: impl FnOnce(&[EntitySnapshot]) -> HashMap<String, u64>,
    ) -> Tally {
        let generation = {
            let mut village = self.village.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(tally) = slot(&mut *village).as_ref() {
                self.hit("village");
                return Arc::clone(tally);
            }
            village.generation
        };
        self.miss("village");
        let tally = Arc::new(compute(&self.world.entities_with(tags)));
        let mut village = self.village.lock().unwrap_or_else(|e| e.into_inner());
        if village.generation == generation {
            *slot(&mut *village) = Some(Arc::clone(&tally));
        } else {
            tracing::debug!("village invalidated during compute, result not cached");
        }
        tally
    }

    /// Completed buildings per type.
    pub fn building_counts(&self) -> Tally {
        self.village_tally(
            |v| &mut v.building_counts,
            &[BUILDING],
            |buildings| {
                let mut counts = HashMap::new();
                for building in buildings {
                    let complete = building
                        .component(BUILDING)
                        .and_then(|c| c.get("complete"))
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(true);
                    if complete && let Some(kind) = building.component_str(BUILDING, "type") {
                        *counts.entry(kind.to_string()).or_insert(0) += 1;
                    }
                }
                counts
            },
        )
    }

    /// Item quantities summed over every storage building.
    pub fn storage_totals(&self) -> Tally {
        self.village_tally(
            |v| &mut v.storage_totals,
            &[BUILDING, STORAGE],
            |buildings| {
                let mut totals = HashMap::new();
                for building in buildings {
                    let Some(items) = building
                        .component(STORAGE)
                        .and_then(|c| c.get("items"))
                        .and_then(serde_json::Value::as_object)
                    else {
                        continue;
                    };
                    for (item, qty) in items {
                        if let Some(qty) = qty.as_u64() {
                            *totals.entry(item.clone()).or_insert(0) += qty;
                        }
                    }
                }
                totals
            },
        )
    }

    pub fn agent_counts_by_behavior(&self) -> Tally {
        self.village_tally(
            |v| &mut v.agents_by_behavior,
            &[AGENT],
            |agents| {
                let mut counts = HashMap::new();
                for agent in agents {
                    let behavior = agent.component_str(AGENT, "behavior").unwrap_or("idle");
                    *counts.entry(behavior.to_string()).or_insert(0) += 1;
                }
                counts
            },
        )
    }

    /// Agents per skill, counting skills with a positive level.
    pub fn agent_counts_by_skill(&self) -> Tally {
        self.village_tally(
            |v| &mut v.agents_by_skill,
            &[AGENT],
            |agents| {
                let mut counts = HashMap::new();
                for agent in agents {
                    let Some(skills) = agent
                        .component(AGENT)
                        .and_then(|c| c.get("skills"))
                        .and_then(serde_json::Value::as_object)
                    else {
                        continue;
                    };
                    for (skill, level) in skills {
                        if level.as_f64().is_some_and(|l| l > 0.0) {
                            *counts.entry(skill.clone()).or_insert(0) += 1;
                        }
                    }
                }
                counts
            },
        )
    }

    /// Drops every village aggregate. Event handlers do the same.
    pub fn invalidate_village(&self) {
        self.village
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate();
    }

    // Tier 3

    /// Clears frame results when `tick` differs from the cached tick.
    pub fn start_frame(&self, tick: u64) {
        let mut frame = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        if frame.tick != Some(tick) {
            *frame = FrameCache {
                tick: Some(tick),
                ..FrameCache::default()
            };
        }
    }

    pub fn current_tick(&self) -> Option<u64> {
        self.frame.lock().unwrap_or_else(|e| e.into_inner()).tick
    }

    fn frame_query(
        &self,
        slot: fn(&mut FrameCache) -> &mut Option<Entities>,
        tags: &[&str],
    ) -> Entities {
        {
            let mut frame = self.frame.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entities) = slot(&mut *frame).as_ref() {
                self.hit("frame");
                return Arc::clone(entities);
            }
        }
        self.miss("frame");
        let entities = Arc::new(self.world.entities_with(tags));
        let mut frame = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        *slot(&mut *frame) = Some(Arc::clone(&entities));
        entities
    }

    pub fn all_buildings(&self) -> Entities {
        self.frame_query(|f| &mut f.all_buildings, &[BUILDING])
    }

    pub fn all_agents(&self) -> Entities {
        self.frame_query(|f| &mut f.all_agents, &[AGENT])
    }

    pub fn storage_buildings(&self) -> Entities {
        self.frame_query(|f| &mut f.storage_buildings, &[BUILDING, STORAGE])
    }

    /// Buildings whose `type` equals `kind`, filtered from
    /// [`all_buildings`](Self::all_buildings).
    pub fn buildings_by_type(&self, kind: &str) -> Entities {
        if let Some(entities) = self
            .frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buildings_by_type
            .get(kind)
        {
            self.hit("frame");
            return Arc::clone(entities);
        }
        self.miss("frame");
        let filtered: Entities = Arc::new(
            self.all_buildings()
                .iter()
                .filter(|b| b.component_str(BUILDING, "type") == Some(kind))
                .cloned()
                .collect(),
        );
        self.frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buildings_by_type
            .insert(kind.to_string(), Arc::clone(&filtered));
        filtered
    }

    // Tier 4

    pub fn world_to_sector(&self, x: f64, y: f64) -> Sector {
        let size = self.config.sector_size;
        ((x / size).floor() as i64, (y / size).floor() as i64)
    }

    /// Cached analysis for the sector containing `(x, y)`. Entries older
    /// than the TTL at `tick` are evicted.
    pub fn aerial_harmony(&self, x: f64, y: f64, tick: u64) -> Option<AerialHarmony> {
        let sector = self.world_to_sector(x, y);
        let mut harmony = self.harmony.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = harmony.get(&sector) else {
            self.miss("spatial");
            return None;
        };
        if entry.age(tick) > self.config.harmony_ttl_ticks {
            harmony.remove(&sector);
            self.miss("spatial");
            return None;
        }
        self.hit("spatial");
        Some(entry.data.clone())
    }

    pub fn set_aerial_harmony(&self, x: f64, y: f64, analysis: AerialHarmony, tick: u64) {
        let sector = self.world_to_sector(x, y);
        self.harmony
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sector, CacheEntry::new(analysis, tick));
    }

    /// Evicts every sector overlapping the square of half-width `radius`
    /// around `(x, y)`. Returns the number evicted.
    pub fn invalidate_aerial_harmony_at(&self, x: f64, y: f64, radius: f64) -> usize {
        let radius = radius.abs();
        let (min_x, min_y) = self.world_to_sector(x - radius, y - radius);
        let (max_x, max_y) = self.world_to_sector(x + radius, y + radius);
        let mut harmony = self.harmony.lock().unwrap_or_else(|e| e.into_inner());
        let before = harmony.len();
        harmony.retain(|(sx, sy), _| !((min_x..=max_x).contains(sx) && (min_y..=max_y).contains(sy)));
        before - harmony.len()
    }

    // All tiers

    pub fn clear_all(&self) {
        self.static_tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.invalidate_village();
        *self.frame.lock().unwrap_or_else(|e| e.into_inner()) = FrameCache::default();
        self.harmony
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        tracing::debug!("prompt cache cleared");
    }

    pub fn stats(&self) -> PromptCacheStats {
        let frame = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        PromptCacheStats {
            static_tables: self
                .static_tables
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            village_aggregates: self
                .village
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .occupancy(),
            frame_entries: frame.occupancy(),
            frame_tick: frame.tick,
            harmony_sectors: self
                .harmony
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }
}

impl Drop for PromptCacheManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PromptCacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptCacheManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
