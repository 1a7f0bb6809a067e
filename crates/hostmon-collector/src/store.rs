use chrono::{DateTime, Utc};
use hostmon_common::types::{CounterVector, EntityId, EntityKind};
use std::collections::HashMap;

/// Last observation of one entity.
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    pub counters: CounterVector,
    pub observed_at: DateTime<Utc>,
}

/// Most recent absolute counters per entity.
///
/// Entities are only ever dropped through [`EntityCounterStore::remove`];
/// there is no expiry.
#[derive(Debug, Default)]
pub struct EntityCounterStore {
    entities: HashMap<EntityId, TrackedEntity>,
}

impl EntityCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `counters` as the new baseline, replacing any previous one.
    pub fn initialize(&mut self, id: EntityId, counters: CounterVector) {
        self.entities.insert(
            id,
            TrackedEntity {
                counters,
                observed_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, id: &EntityId) -> Option<&CounterVector> {
        self.entities.get(id).map(|e| &e.counters)
    }

    pub fn observed_at(&self, id: &EntityId) -> Option<DateTime<Utc>> {
        self.entities.get(id).map(|e| e.observed_at)
    }

    /// Returns `counters - baseline` and makes `counters` the new baseline.
    ///
    /// An unknown entity is initialized instead and `None` comes back: one
    /// sample is not enough for a rate.
    pub fn snapshot_and_advance(
        &mut self,
        id: &EntityId,
        counters: CounterVector,
    ) -> Option<CounterVector> {
        match self.entities.get_mut(id) {
            Some(entity) => {
                let delta = counters.delta_since(&entity.counters);
                entity.counters = counters;
                entity.observed_at = Utc::now();
                Some(delta)
            }
            None => {
                self.initialize(id.clone(), counters);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &EntityId) -> bool {
        self.entities.remove(id).is_some()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Identities of one kind, in no particular order.
    pub fn tracked(&self, kind: EntityKind) -> impl Iterator<Item = &EntityId> {
        self.entities.keys().filter(move |id| id.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
