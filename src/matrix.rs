//! Precomputed travel matrix.
//!
//! Stores a dense directed table of (minutes, km) keyed by location
//! identifiers. Lookups for pairs the table does not hold fall back to a
//! default travel time; the planner logs such gaps as degraded data, once
//! per absent location and once per origin with missing directed pairs,
//! instead of failing the run.

use std::collections::HashMap;

use crate::model::Minutes;
use crate::traits::TravelCosts;

/// Travel time assumed for a pair missing from the table.
pub const DEFAULT_TRAVEL_MINUTES: Minutes = 25;

/// Average driving speed used to derive a distance for missing pairs.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Distance estimate for a travel time at the default driving speed.
pub fn estimate_km(minutes: Minutes) -> f64 {
    minutes as f64 / 60.0 * DEFAULT_SPEED_KMH
}

#[derive(Debug, Clone)]
pub struct TravelMatrix {
    depot: String,
    index: HashMap<String, usize>,
    size: usize,
    cells: Vec<Option<(Minutes, f64)>>,
    default_minutes: Minutes,
}

impl TravelMatrix {
    pub fn builder(depot: impl Into<String>) -> TravelMatrixBuilder {
        TravelMatrixBuilder {
            depot: depot.into(),
            entries: Vec::new(),
            default_minutes: DEFAULT_TRAVEL_MINUTES,
        }
    }

    /// Travel time used for pairs the table does not hold.
    pub fn default_minutes(&self) -> Minutes {
        self.default_minutes
    }

    /// Distance used for pairs the table does not hold.
    pub fn default_km(&self) -> f64 {
        estimate_km(self.default_minutes)
    }

    /// Number of distinct locations, depot included.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The stored entry for a pair, if any.
    pub fn entry(&self, from: &str, to: &str) -> Option<(Minutes, f64)> {
        let from_idx = *self.index.get(from)?;
        let to_idx = *self.index.get(to)?;
        self.cells[from_idx * self.size + to_idx]
    }
}

impl TravelCosts for TravelMatrix {
    fn depot(&self) -> &str {
        &self.depot
    }

    fn time(&self, from: &str, to: &str) -> Minutes {
        if from == to {
            return 0;
        }
        self.entry(from, to)
            .map(|(minutes, _)| minutes)
            .unwrap_or(self.default_minutes)
    }

    fn distance_km(&self, from: &str, to: &str) -> f64 {
        if from == to {
            return 0.0;
        }
        self.entry(from, to)
            .map(|(_, km)| km)
            .unwrap_or_else(|| self.default_km())
    }

    fn has_location(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn has_entry(&self, from: &str, to: &str) -> bool {
        from == to || self.entry(from, to).is_some()
    }
}

/// Collects directed entries, then lays them out densely.
#[derive(Debug, Clone)]
pub struct TravelMatrixBuilder {
    depot: String,
    entries: Vec<(String, String, Minutes, f64)>,
    default_minutes: Minutes,
}

impl TravelMatrixBuilder {
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>, minutes: Minutes, km: f64) {
        self.entries.push((from.into(), to.into(), minutes, km));
    }

    pub fn entry(mut self, from: impl Into<String>, to: impl Into<String>, minutes: Minutes, km: f64) -> Self {
        self.insert(from, to, minutes, km);
        self
    }

    /// Adds the same cost in both directions.
    pub fn symmetric(self, a: &str, b: &str, minutes: Minutes, km: f64) -> Self {
        self.entry(a, b, minutes, km).entry(b, a, minutes, km)
    }

    pub fn default_minutes(mut self, minutes: Minutes) -> Self {
        self.default_minutes = minutes;
        self
    }

    pub fn build(self) -> TravelMatrix {
        let mut index: HashMap<String, usize> = HashMap::new();
        index.insert(self.depot.clone(), 0);
        for (from, to, _, _) in &self.entries {
            for key in [from, to] {
                if !index.contains_key(key) {
                    let next = index.len();
                    index.insert(key.clone(), next);
                }
            }
        }

        let size = index.len();
        let mut cells = vec![None; size * size];
        for i in 0..size {
            cells[i * size + i] = Some((0, 0.0));
        }
        for (from, to, minutes, km) in &self.entries {
            let from_idx = index[from];
            let to_idx = index[to];
            if from_idx != to_idx {
                cells[from_idx * size + to_idx] = Some((*minutes, *km));
            }
        }

        TravelMatrix {
            depot: self.depot,
            index,
            size,
            cells,
            default_minutes: self.default_minutes,
        }
    }
}
