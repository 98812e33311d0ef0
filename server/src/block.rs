//! Destructible blocks and their per-block locking
//!
//! Every block carries its own mutex so that concurrent hits on different
//! blocks never contend, while concurrent hits on the same block serialize
//! and report exactly the damage they applied. Exactly one caller observes
//! the transition into the destroyed state, which the coordinator uses to
//! remove the block from the active layer precisely once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// 3-axis coordinate identifying a block, rendered as `X_Y_Z` on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl BlockKey {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Parses the wire form `X_Y_Z`. Returns None for anything else.
    pub fn parse(s: &str) -> Option<BlockKey> {
        let mut parts = s.split('_');
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(BlockKey { x, y, z })
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.x, self.y, self.z)
    }
}

/// Outcome of a single attack or repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Effect was applied under the block's lock. `amount` is the actual
    /// hit-point change (may be less than requested near the clamp), and
    /// `destroyed` is true for exactly the call that brought hp to zero.
    Applied { amount: i64, destroyed: bool },
    /// The block was destroyed before this call; nothing was mutated.
    AlreadyDestroyed,
}

#[derive(Debug)]
struct BlockState {
    hp: i64,
    destroyed: bool,
}

/// A single destructible unit of the cube.
#[derive(Debug)]
pub struct Block {
    key: BlockKey,
    max_hp: i64,
    state: Mutex<BlockState>,
}

impl Block {
    pub fn new(key: BlockKey, hp: i64) -> Self {
        Self {
            key,
            max_hp: hp,
            state: Mutex::new(BlockState {
                hp,
                destroyed: hp <= 0,
            }),
        }
    }

    /// Rebuilds a block from persisted data with a fresh lock.
    pub fn restore(key: BlockKey, hp: i64, max_hp: i64) -> Self {
        Self {
            key,
            max_hp,
            state: Mutex::new(BlockState {
                hp: hp.max(0),
                destroyed: hp <= 0,
            }),
        }
    }

    pub fn key(&self) -> BlockKey {
        self.key
    }

    pub fn max_hp(&self) -> i64 {
        self.max_hp
    }

    /// Point-in-time hit points; advisory only.
    pub fn hp(&self) -> i64 {
        self.state.lock().unwrap().hp
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    /// Removes up to `amount` hit points. The reported amount equals the
    /// hit points actually removed, so the damage totals of concurrent
    /// callers always sum to the real reduction.
    pub fn attack(&self, amount: i64) -> HitOutcome {
        let mut state = self.state.lock().unwrap();
        if state.destroyed {
            return HitOutcome::AlreadyDestroyed;
        }

        let applied = amount.clamp(0, state.hp);
        state.hp -= applied;
        if state.hp == 0 {
            state.destroyed = true;
            return HitOutcome::Applied {
                amount: applied,
                destroyed: true,
            };
        }

        HitOutcome::Applied {
            amount: applied,
            destroyed: false,
        }
    }

    /// Restores up to `amount` hit points, capped at the block's maximum.
    /// Destroyed blocks stay destroyed.
    pub fn repair(&self, amount: i64) -> HitOutcome {
        let mut state = self.state.lock().unwrap();
        if state.destroyed {
            return HitOutcome::AlreadyDestroyed;
        }

        let applied = amount.clamp(0, self.max_hp - state.hp);
        state.hp += applied;

        HitOutcome::Applied {
            amount: applied,
            destroyed: false,
        }
    }
}
