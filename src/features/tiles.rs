//! Tile coding with a bounded index hash table.
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Tile indices produced for one input; one per tiling.
pub type Tiles = SmallVec<[usize; 8]>;

type Key = SmallVec<[i64; 8]>;

/// Assigns consecutive indices to tile coordinate keys, up to a fixed capacity.
///
/// Once the table is full, unseen keys are hashed into `[0, capacity)` and may share an index
/// with another key. Index assignment depends only on the order in which keys are first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHashTable {
    capacity: usize,
    indices: HashMap<Key, usize>,
    overflow_count: u64,
}

impl IndexHashTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            indices: HashMap::new(),
            overflow_count: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys with a dedicated (non-hashed) index.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of lookups that fell back to hashing because the table was full.
    pub const fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// The index of `key`, inserting it if there is room.
    pub fn index(&mut self, key: &[i64]) -> usize {
        if let Some(&index) = self.indices.get(key) {
            return index;
        }
        if self.indices.len() >= self.capacity {
            self.overflow_count += 1;
            // The remainder is below the (usize) capacity so the cast is lossless
            return (fnv1a(key) % self.capacity.max(1) as u64) as usize;
        }
        let index = self.indices.len();
        self.indices.insert(key.iter().copied().collect(), index);
        index
    }
}

/// 64-bit FNV-1a hash over the little-endian bytes of each integer.
fn fnv1a(key: &[i64]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    key.iter()
        .flat_map(|x| x.to_le_bytes())
        .fold(OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(PRIME)
        })
}

/// Tile coding configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCodingConfig {
    /// Capacity of the index hash table; the feature dimension.
    pub table_size: usize,
    /// Number of overlapping, offset tilings.
    pub num_tilings: usize,
    /// Number of tiles spanning a unit coordinate range in each tiling.
    pub tiling_size: usize,
}

impl TileCodingConfig {
    pub const fn new(table_size: usize, num_tilings: usize, tiling_size: usize) -> Self {
        Self {
            table_size,
            num_tilings,
            tiling_size,
        }
    }

    /// Check that every option is usable.
    ///
    /// # Errors
    /// [`ConfigError::InvalidTileCoding`] if any of the sizes is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_size == 0 || self.num_tilings == 0 || self.tiling_size == 0 {
            return Err(ConfigError::InvalidTileCoding(*self));
        }
        Ok(())
    }
}

/// Tile coder over continuous coordinates and integer tags.
///
/// Each tiling `t` partitions every coordinate into tiles of width `1 / tiling_size` shifted by
/// an asymmetric offset (`t * (1 + 2 i) / num_tilings` tile widths for coordinate `i`).
/// Integer tags (such as an action index) are not tiled; they are appended to the tile key so
/// that distinct tags never share a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCoder {
    config: TileCodingConfig,
    table: IndexHashTable,
}

impl TileCoder {
    pub fn new(config: TileCodingConfig) -> Self {
        Self {
            config,
            table: IndexHashTable::new(config.table_size),
        }
    }

    pub const fn config(&self) -> &TileCodingConfig {
        &self.config
    }

    pub const fn table(&self) -> &IndexHashTable {
        &self.table
    }

    /// Feature dimension.
    pub const fn dim(&self) -> usize {
        self.config.table_size
    }

    /// Active tile indices for pre-scaled coordinates.
    ///
    /// `floats` are in units of tiles; one active tile per tiling is returned.
    pub fn tiles(&mut self, floats: &[f64], ints: &[i64]) -> Tiles {
        // Tiling counts come from a validated usize config and are small.
        let num_tilings = self.config.num_tilings as i64;
        let quantized: SmallVec<[i64; 4]> = floats
            .iter()
            .map(|x| (x * num_tilings as f64).floor() as i64)
            .collect();

        let mut tiles = Tiles::new();
        for tiling in 0..num_tilings {
            let mut key = Key::new();
            key.push(tiling);
            let mut offset = tiling;
            for q in &quantized {
                key.push((q + offset).div_euclid(num_tilings));
                offset += 2 * tiling;
            }
            key.extend_from_slice(ints);
            tiles.push(self.table.index(&key));
        }
        tiles
    }

    /// Active tile indices for a state-action pair.
    ///
    /// # Args
    /// * `coordinates` - State coordinates normalized to `[0, 1]`.
    /// * `action` - Action index.
    pub fn encode(&mut self, coordinates: &[f64], action: usize) -> Tiles {
        let scale = self.config.tiling_size as f64;
        let scaled: SmallVec<[f64; 4]> = coordinates.iter().map(|x| x * scale).collect();
        self.tiles(&scaled, &[action as i64])
    }
}
