use std::collections::HashMap;
use std::hash::Hash;

use crate::coordinate::Coordinate;

/// Objects currently shown by the renderer, plus the pick registry mapping
/// pickable objects back to the block they represent.
#[derive(Debug, Clone)]
pub struct SceneState<K> {
    tracked: Vec<K>,
    picks: HashMap<K, Coordinate>,
}

impl<K> Default for SceneState<K> {
    fn default() -> Self {
        Self {
            tracked: Vec::new(),
            picks: HashMap::new(),
        }
    }
}

impl<K> SceneState<K>
where
    K: Copy + Eq + Hash,
{
    /// Drops every tracked object and pick association at once, returning the
    /// objects so the caller can tear them down.
    pub fn clear(&mut self) -> Vec<K> {
        self.picks.clear();
        std::mem::take(&mut self.tracked)
    }

    pub fn track(&mut self, object: K, coordinate: Coordinate) {
        self.tracked.push(object);
        self.picks.insert(object, coordinate);
    }

    /// Tracks an object for teardown without making it pickable.
    pub fn track_unpicked(&mut self, object: K) {
        self.tracked.push(object);
    }

    pub fn resolve(&self, object: &K) -> Option<Coordinate> {
        self.picks.get(object).copied()
    }

    pub fn pickable(&self) -> impl Iterator<Item = (&K, &Coordinate)> {
        self.picks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
