//! Persisted match state and the reload repair step
//!
//! A snapshot is plain data: no mutexes, no instants, just hit points,
//! player records, and the remaining time. Activating a snapshot is the
//! explicit repair step that rebuilds every lock primitive fresh and
//! re-derives the deadline, and it must run before the restored state is
//! exposed to concurrent traffic.

use crate::block::{Block, BlockKey};
use crate::cube::Cube;
use crate::player::{Player, PlayerRecord};
use crate::state::GameState;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One block's persisted state. Destroyed blocks are kept with zero hit
/// points so the restored cube knows they are gone.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub key: BlockKey,
    pub hp: i64,
}

/// Everything needed to resume a match after a reload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub name: String,
    pub cube_size: u32,
    pub block_hp: i64,
    pub time_left_secs: u64,
    pub blocks: Vec<BlockRecord>,
    pub players: Vec<PlayerRecord>,
}

impl GameSnapshot {
    /// Point-in-time capture of a running match.
    pub fn capture(state: &GameState) -> GameSnapshot {
        let cube = state.cube();
        let mut blocks: Vec<BlockRecord> = cube
            .all_blocks()
            .map(|b| BlockRecord {
                key: b.key(),
                hp: b.hp(),
            })
            .collect();
        blocks.sort_by_key(|r| r.key);

        GameSnapshot {
            name: state.name().to_string(),
            cube_size: cube.size(),
            block_hp: cube.block_hp(),
            time_left_secs: state.time_left().as_secs(),
            blocks,
            players: state.player_records(),
        }
    }

    /// Rebuilds a ready-to-use coordinator: fresh per-block and per-player
    /// locks, every session logged out, deadline restarted from the saved
    /// time left.
    pub fn activate(&self, score_path: PathBuf) -> GameState {
        let blocks: Vec<Arc<Block>> = self
            .blocks
            .iter()
            .map(|r| Arc::new(Block::restore(r.key, r.hp, self.block_hp)))
            .collect();
        let cube = Cube::from_blocks(self.cube_size, self.block_hp, blocks);

        let players: Vec<Arc<Player>> = self
            .players
            .iter()
            .map(|r| Arc::new(Player::from_record(r)))
            .collect();

        info!(
            "Activated snapshot '{}': {} blocks live, {} players, {}s left",
            self.name,
            cube.live_count(),
            players.len(),
            self.time_left_secs
        );

        GameState::from_parts(
            &self.name,
            cube,
            players,
            Duration::from_secs(self.time_left_secs),
            score_path,
        )
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let data = bincode::serialize(self)?;
        fs::write(path, data)?;
        info!("Saved snapshot to {}", path.display());
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<GameSnapshot, Box<dyn std::error::Error>> {
        let data = fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }
}
