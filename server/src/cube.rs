//! The cube: the shared destructible grid and its active layer
//!
//! Block storage is immutable after construction; only the active layer (the
//! set of currently targetable blocks) changes, behind its own read-write
//! lock. Layer reads never take any block's mutation lock, so target listings
//! stay "recent" rather than linearizable, which is all the advisory
//! GETTARGETS view needs.

use crate::block::{Block, BlockKey};
use log::info;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// The destructible 3D grid.
#[derive(Debug)]
pub struct Cube {
    size: u32,
    block_hp: i64,
    blocks: HashMap<BlockKey, Arc<Block>>,
    layer: RwLock<HashSet<BlockKey>>,
}

impl Cube {
    /// Builds a `size`³ cube with every block at `block_hp` hit points.
    pub fn new(size: u32, block_hp: i64) -> Self {
        let mut blocks = HashMap::new();
        let mut layer = HashSet::new();

        for x in 0..size {
            for y in 0..size {
                for z in 0..size {
                    let key = BlockKey::new(x, y, z);
                    blocks.insert(key, Arc::new(Block::new(key, block_hp)));
                    layer.insert(key);
                }
            }
        }

        info!("Built cube of {} blocks at {} hp each", blocks.len(), block_hp);
        Self {
            size,
            block_hp,
            blocks,
            layer: RwLock::new(layer),
        }
    }

    /// Rebuilds a cube from restored blocks; destroyed blocks stay out of
    /// the active layer.
    pub fn from_blocks(size: u32, block_hp: i64, blocks: Vec<Arc<Block>>) -> Self {
        let mut map = HashMap::new();
        let mut layer = HashSet::new();

        for block in blocks {
            if !block.is_destroyed() {
                layer.insert(block.key());
            }
            map.insert(block.key(), block);
        }

        Self {
            size,
            block_hp,
            blocks: map,
            layer: RwLock::new(layer),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn block_hp(&self) -> i64 {
        self.block_hp
    }

    /// Resolves a coordinate to a live block, or None if it was never part
    /// of the cube or has already been destroyed.
    pub fn get(&self, key: BlockKey) -> Option<Arc<Block>> {
        if !self.layer.read().unwrap().contains(&key) {
            return None;
        }
        self.blocks.get(&key).cloned()
    }

    /// Removes a destroyed block from the active layer. Idempotent: a second
    /// removal for the same key is a no-op.
    pub fn remove(&self, key: BlockKey) {
        if self.layer.write().unwrap().remove(&key) {
            info!("Removed block {} from the active layer", key);
        }
    }

    /// True while at least one block remains targetable.
    pub fn is_alive(&self) -> bool {
        !self.layer.read().unwrap().is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.layer.read().unwrap().len()
    }

    /// Point-in-time (coordinate, hit points) listing of the active layer,
    /// sorted by coordinate. Reads are per-block and advisory.
    pub fn snapshot(&self) -> Vec<(BlockKey, i64)> {
        let keys: Vec<BlockKey> = {
            let layer = self.layer.read().unwrap();
            layer.iter().copied().collect()
        };

        let mut entries: Vec<(BlockKey, i64)> = keys
            .into_iter()
            .filter_map(|key| self.blocks.get(&key).map(|b| (key, b.hp())))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    /// Renders the active layer for GETTARGETS as `X_Y_Z:hp` entries joined
    /// by commas.
    pub fn targets_string(&self) -> String {
        self.snapshot()
            .iter()
            .map(|(key, hp)| format!("{}:{}", key, hp))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Uniformly samples up to `count` distinct live blocks with at most
    /// `attempts` draws, so the loop stays bounded when fewer distinct
    /// blocks exist than requested.
    pub fn random_targets(&self, count: usize, attempts: usize) -> Vec<Arc<Block>> {
        let keys: Vec<BlockKey> = {
            let layer = self.layer.read().unwrap();
            layer.iter().copied().collect()
        };
        if keys.is_empty() {
            return Vec::new();
        }

        let wanted = count.min(keys.len());
        let mut rng = rand::thread_rng();
        let mut picked: Vec<BlockKey> = Vec::with_capacity(wanted);
        let mut draws = 0;

        while picked.len() < wanted && draws < attempts {
            let key = keys[rng.gen_range(0..keys.len())];
            if !picked.contains(&key) {
                picked.push(key);
            }
            draws += 1;
        }

        picked
            .into_iter()
            .filter_map(|key| self.blocks.get(&key).cloned())
            .collect()
    }

    /// Every block ever created, live or destroyed; used when persisting.
    pub fn all_blocks(&self) -> impl Iterator<Item = &Arc<Block>> {
        self.blocks.values()
    }
}
