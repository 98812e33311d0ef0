//! # Game Server Library
//!
//! Authoritative server for the cube-siege game: attackers try to destroy a
//! shared 3D grid of blocks before the clock runs out, defenders repair and
//! shield it. Every state change is request-driven; there is no simulation
//! tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server owns the only copy of the cube and every player account.
//! Clients send short action requests (attack, repair, bomb, shield, buy,
//! level-up, boost) and receive result codes; all validation (cooldowns,
//! balances, block liveness) happens here.
//!
//! ### Fine-Grained Concurrency
//! Every block and every player carries its own lock. Concurrent actions on
//! different blocks run fully in parallel; actions on the same block
//! serialize and report exactly the damage each caller applied; actions by
//! the same player serialize so a cooldown check-then-set is atomic.
//! Registration goes through the master player map's write lock so duplicate
//! usernames can never both win a race.
//!
//! ### Win Conditions
//! An independent periodic evaluator reads the cube's liveness and the
//! elapsed time and settles the verdict exactly once: cube destroyed means
//! the attackers won, an expired clock means the defenders won. On
//! termination the final scores are exported as `username score` lines.
//!
//! ## Module Organization
//!
//! - [`block`]: destructible blocks with per-block locking
//! - [`cube`]: the grid, its active layer, and target sampling
//! - [`player`]: role-tagged accounts, cooldowns, economy, leveling
//! - [`state`]: the coordinator that routes requests and owns the verdict
//! - [`snapshot`]: lock-free persisted state and the reload repair step
//! - [`network`]: TCP line transport and the status ticker
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{run_status_ticker, Server};
//! use server::state::GameState;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(GameState::new(
//!         "match-1",
//!         5,                         // 5x5x5 cube
//!         10,                        // hit points per block
//!         Duration::from_secs(600),  // time limit
//!         "player_scores.txt".into(),
//!     ));
//!
//!     let server = Server::new("127.0.0.1:8080", Arc::clone(&state)).await?;
//!     tokio::spawn(run_status_ticker(Arc::clone(&state), Duration::from_secs(10)));
//!     server.run().await
//! }
//! ```

pub mod block;
pub mod cube;
pub mod network;
pub mod player;
pub mod snapshot;
pub mod state;
