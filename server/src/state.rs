//! The authoritative coordinator: players, the cube, and the match verdict
//!
//! One `GameState` instance is shared by every connection task. Registration
//! goes through the master player map's write lock so exactly one of two
//! simultaneous same-username registrations wins. Gameplay actions resolve
//! the actor and the target block, then run entirely under those two
//! fine-grained locks; faults in a single request are converted to failure
//! codes at this boundary and never disturb other sessions.

use crate::block::BlockKey;
use crate::cube::Cube;
use crate::player::{Player, PlayerRecord};
use log::{error, info, warn};
use shared::{
    RegisterExtras, Request, Role, BOMB_SAMPLE_ATTEMPTS, BOMB_SPLASH_TARGETS, LEADERBOARD_SIZE,
    VERDICT_ATTACKERS_WON, VERDICT_CRASHED, VERDICT_DEFENDERS_WON, VERDICT_RUNNING,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Shared authoritative state for one match.
#[derive(Debug)]
pub struct GameState {
    name: String,
    cube: Cube,
    players: RwLock<HashMap<String, Arc<Player>>>,
    start: Instant,
    time_limit: Duration,
    verdict: AtomicI64,
    scores_saved: AtomicBool,
    score_path: PathBuf,
}

impl GameState {
    pub fn new(
        name: &str,
        size: u32,
        block_hp: i64,
        time_limit: Duration,
        score_path: PathBuf,
    ) -> Self {
        info!(
            "Starting match '{}': {}x{}x{} cube, {} hp per block, {}s limit",
            name,
            size,
            size,
            size,
            block_hp,
            time_limit.as_secs()
        );
        Self::from_parts(name, Cube::new(size, block_hp), Vec::new(), time_limit, score_path)
    }

    /// Assembles a state from already-built pieces; used both by `new` and
    /// by snapshot activation. The deadline starts counting from here.
    pub fn from_parts(
        name: &str,
        cube: Cube,
        players: Vec<Arc<Player>>,
        time_limit: Duration,
        score_path: PathBuf,
    ) -> Self {
        let map = players
            .into_iter()
            .map(|p| (p.username().to_string(), p))
            .collect();

        Self {
            name: name.to_string(),
            cube,
            players: RwLock::new(map),
            start: Instant::now(),
            time_limit,
            verdict: AtomicI64::new(VERDICT_RUNNING),
            scores_saved: AtomicBool::new(false),
            score_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cube(&self) -> &Cube {
        &self.cube
    }

    pub fn time_left(&self) -> Duration {
        self.time_limit.saturating_sub(self.start.elapsed())
    }

    pub fn verdict(&self) -> i64 {
        self.verdict.load(Ordering::SeqCst)
    }

    /// Every registered player, for persistence.
    pub fn player_records(&self) -> Vec<PlayerRecord> {
        self.players
            .read()
            .unwrap()
            .values()
            .map(|p| p.record())
            .collect()
    }

    pub fn player(&self, username: &str) -> Option<Arc<Player>> {
        self.players.read().unwrap().get(username).cloned()
    }

    /// Creates an account. The check-and-insert runs under the map's write
    /// lock, so of two racing registrations for one username exactly one
    /// succeeds.
    pub fn register(&self, username: &str, role: Role, extras: Option<&RegisterExtras>) -> bool {
        if username.is_empty() {
            return false;
        }

        let mut players = self.players.write().unwrap();
        if players.contains_key(username) {
            return false;
        }

        let player = match extras {
            Some(e) => Player::from_extras(username, role, e),
            None => Player::new(username, role),
        };
        info!("Registered {:?} {}", role, username);
        players.insert(username.to_string(), Arc::new(player));
        true
    }

    /// Starts a session. Fails for unknown usernames and for accounts that
    /// are already logged in.
    pub fn login(&self, username: &str) -> Option<Role> {
        let player = self.player(username)?;
        if player.login() {
            info!("{} logged in", username);
            Some(player.role())
        } else {
            None
        }
    }

    pub fn logout(&self, username: &str) -> bool {
        match self.player(username) {
            Some(player) => {
                player.logout();
                info!("{} logged out", username);
                true
            }
            None => false,
        }
    }

    fn find_role(&self, username: &str) -> i64 {
        self.player(username).map(|p| p.role().code()).unwrap_or(-1)
    }

    /// Attack or repair one block. Returns the applied effect, 0 on a closed
    /// cooldown gate, -1 for unknown players/blocks, role mismatch, or an
    /// already-destroyed target.
    pub fn request_primary(&self, username: &str, role: Role, block: &str) -> i64 {
        let player = match self.player(username) {
            Some(p) if p.role() == role => p,
            _ => return -1,
        };
        let key = match BlockKey::parse(block) {
            Some(k) => k,
            None => return -1,
        };
        let target = match self.cube.get(key) {
            Some(b) => b,
            None => return -1,
        };

        let outcome = player.primary(&target);
        if outcome.destroyed {
            self.cube.remove(key);
        }
        outcome.code
    }

    /// Bomb (attacker) or shield (defender) the given block.
    pub fn request_secondary(&self, username: &str, role: Role, block: &str) -> i64 {
        let player = match self.player(username) {
            Some(p) if p.role() == role => p,
            _ => return -1,
        };
        let key = match BlockKey::parse(block) {
            Some(k) => k,
            None => return -1,
        };

        match role {
            Role::Attacker => {
                let target = self.cube.get(key);
                // Splash never re-hits the chosen block
                let splash = self
                    .cube
                    .random_targets(BOMB_SPLASH_TARGETS, BOMB_SAMPLE_ATTEMPTS)
                    .into_iter()
                    .filter(|b| b.key() != key)
                    .collect();

                let outcome = player.bomb(target, splash);
                for destroyed in &outcome.destroyed {
                    self.cube.remove(*destroyed);
                }
                outcome.code
            }
            Role::Defender => match self.cube.get(key) {
                Some(target) => player.shield(&target).code,
                None => -1,
            },
        }
    }

    /// Buys a bomb or shield, enforcing that the verb matches the role.
    pub fn buy(&self, username: &str, role: Role) -> i64 {
        match self.player(username) {
            Some(p) if p.role() == role => p.buy_item(),
            _ => 0,
        }
    }

    pub fn boost(&self, username: &str) -> i64 {
        match self.player(username) {
            Some(p) => p.boost(),
            None => 0,
        }
    }

    pub fn level_primary(&self, username: &str, role: Role) -> i64 {
        match self.player(username) {
            Some(p) if p.role() == role => p.level_primary(),
            _ => 0,
        }
    }

    pub fn level_speed(&self, username: &str) -> i64 {
        match self.player(username) {
            Some(p) => p.level_speed(),
            None => 0,
        }
    }

    /// Top 10 players by score, one `rank: username score` entry per player,
    /// joined by `;` to stay on one response line.
    pub fn leaderboard(&self) -> String {
        let mut players: Vec<Arc<Player>> =
            self.players.read().unwrap().values().cloned().collect();
        players.sort_by_key(|p| std::cmp::Reverse(p.score()));

        players
            .iter()
            .take(LEADERBOARD_SIZE)
            .enumerate()
            .map(|(i, p)| format!("{}: {} {}", i + 1, p.username(), p.score()))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Read-only win check: cube destroyed means the attackers won, an
    /// expired clock with the cube standing means the defenders won. The
    /// verdict transitions at most once; concurrent evaluations cannot
    /// flip-flop it. Takes no per-player or per-block lock.
    pub fn evaluate_status(&self) -> i64 {
        let current = self.verdict.load(Ordering::SeqCst);
        if current != VERDICT_RUNNING {
            return current;
        }

        if !self.cube.is_alive() {
            return self.finish(VERDICT_ATTACKERS_WON, "Cube destroyed, attackers won");
        }
        if self.start.elapsed() > self.time_limit {
            return self.finish(VERDICT_DEFENDERS_WON, "Cube survived, defenders won");
        }
        VERDICT_RUNNING
    }

    /// Marks the match as crashed; used when the server hits an internal
    /// fault it cannot recover from. Only transitions from running.
    pub fn mark_crashed(&self) -> i64 {
        self.finish(VERDICT_CRASHED, "Match crashed")
    }

    fn finish(&self, result: i64, message: &str) -> i64 {
        if self
            .verdict
            .compare_exchange(
                VERDICT_RUNNING,
                result,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            info!("{}", message);
            if let Err(e) = self.save_scores() {
                error!("Failed to save scores: {}", e);
            }
        }
        self.verdict.load(Ordering::SeqCst)
    }

    /// Writes `username score` lines, once per match termination.
    fn save_scores(&self) -> std::io::Result<()> {
        if self.scores_saved.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut players: Vec<Arc<Player>> =
            self.players.read().unwrap().values().cloned().collect();
        players.sort_by_key(|p| std::cmp::Reverse(p.score()));

        let mut writer = BufWriter::new(File::create(&self.score_path)?);
        for player in players {
            writeln!(writer, "{} {}", player.username(), player.score())?;
        }
        writer.flush()?;
        info!("Saved scores to {}", self.score_path.display());
        Ok(())
    }

    /// Parses one request line and routes it. Any per-request fault becomes
    /// a failure code in the response; unrecognized lines yield an empty
    /// response.
    pub fn dispatch(&self, line: &str) -> String {
        let request = match Request::parse(line) {
            Some(r) => r,
            None => {
                warn!("Unparseable request: {:?}", line);
                return String::new();
            }
        };

        match request {
            Request::Register {
                username,
                role,
                extras,
            } => {
                let ok = self.register(&username, role, extras.as_ref());
                format!("REGISTER-{}-{}-{}", ok as i64, username, role.code())
            }
            Request::Login { username } => {
                let ok = self.login(&username).is_some();
                format!(
                    "LOGIN-{}-{}-{}",
                    ok as i64,
                    username,
                    self.find_role(&username)
                )
            }
            Request::Logout { username } => {
                let ok = self.logout(&username);
                format!("LOGOUT-{}-{}", ok as i64, username)
            }
            Request::Attack { username, block } => {
                let res = self.request_primary(&username, Role::Attacker, &block);
                format!("ATTACK-({})-{}", res, username)
            }
            Request::Repair { username, block } => {
                let res = self.request_primary(&username, Role::Defender, &block);
                format!("REPAIR-({})-{}", res, username)
            }
            Request::Bomb { username, block } => {
                let res = self.request_secondary(&username, Role::Attacker, &block);
                format!("BOMB-({})-{}", res, username)
            }
            Request::Shield { username, block } => {
                let res = self.request_secondary(&username, Role::Defender, &block);
                format!("SHIELD-({})-{}", res, username)
            }
            Request::BuyBomb { username } => {
                let res = self.buy(&username, Role::Attacker);
                format!("BUYBOMB-({})-{}", res, username)
            }
            Request::BuyShield { username } => {
                let res = self.buy(&username, Role::Defender);
                format!("BUYSHIELD-({})-{}", res, username)
            }
            Request::LevelAttack { username } => {
                let res = self.level_primary(&username, Role::Attacker);
                format!("LVLATK-({})-{}", res, username)
            }
            Request::LevelRepair { username } => {
                let res = self.level_primary(&username, Role::Defender);
                format!("LVLREP-({})-{}", res, username)
            }
            Request::LevelSpeed { username, .. } => {
                let res = self.level_speed(&username);
                format!("LVLSPD-({})-{}", res, username)
            }
            Request::GetTargets => format!("TARGETS-{}", self.cube.targets_string()),
            Request::GetEnd => {
                format!("GETEND-({})-{}", self.evaluate_status(), self.leaderboard())
            }
            Request::Boost { username, .. } => {
                format!("BOOST-({})", self.boost(&username))
            }
            Request::GetPlayer { username } => match self.player(&username) {
                Some(p) => format!("GETPLAYER-{}", p.describe()),
                None => format!("GETPLAYER-unknown player {}", username),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn temp_score_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("blocksiege_scores_{}_{}.txt", tag, std::process::id()))
    }

    fn test_state(size: u32, block_hp: i64, limit_secs: u64) -> GameState {
        GameState::new(
            "test",
            size,
            block_hp,
            Duration::from_secs(limit_secs),
            temp_score_path("state"),
        )
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let state = test_state(2, 10, 60);
        assert!(state.register("alice", Role::Attacker, None));
        assert!(!state.register("alice", Role::Defender, None));
        assert_eq!(state.player("alice").unwrap().role(), Role::Attacker);
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let state = Arc::new(test_state(2, 10, 60));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || state.register("alice", Role::Attacker, None))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(state.player_records().len(), 1);
    }

    #[test]
    fn test_login_rules() {
        let state = test_state(2, 10, 60);
        state.register("alice", Role::Attacker, None);

        assert_eq!(state.login("alice"), Some(Role::Attacker));
        assert_eq!(state.login("alice"), None); // already active
        assert_eq!(state.login("nobody"), None);

        assert!(state.logout("alice"));
        assert_eq!(state.login("alice"), Some(Role::Attacker));
        assert!(!state.logout("nobody"));
    }

    #[test]
    fn test_primary_validation_failures() {
        let state = test_state(2, 10, 60);
        state.register("alice", Role::Attacker, None);
        state.register("bob", Role::Defender, None);

        assert_eq!(state.request_primary("nobody", Role::Attacker, "0_0_0"), -1);
        assert_eq!(state.request_primary("alice", Role::Attacker, "not_a_key"), -1);
        assert_eq!(state.request_primary("alice", Role::Attacker, "9_9_9"), -1);
        // Verb/role mismatch is rejected before any lock is taken
        assert_eq!(state.request_primary("bob", Role::Attacker, "0_0_0"), -1);
    }

    #[test]
    fn test_end_to_end_attack_scenario() {
        // One block at 10 hp against an attacker with rating 5
        let state = test_state(1, 10, 600);
        state.register("alice", Role::Attacker, None);
        let alice = state.player("alice").unwrap();
        alice.set_rating(5);

        assert_eq!(state.request_primary("alice", Role::Attacker, "0_0_0"), 5);
        alice.rewind_cooldowns(Duration::from_secs(2));
        assert_eq!(state.request_primary("alice", Role::Attacker, "0_0_0"), 5);
        alice.rewind_cooldowns(Duration::from_secs(2));
        // Destroyed and removed from the layer: lookup now fails
        assert_eq!(state.request_primary("alice", Role::Attacker, "0_0_0"), -1);

        assert!(!state.cube().is_alive());
        assert_eq!(alice.credits(), 10);
    }

    #[test]
    fn test_bomb_destruction_removes_blocks() {
        let state = test_state(1, 4, 600);
        state.register("alice", Role::Attacker, None);
        let alice = state.player("alice").unwrap();
        alice.gain_credits(shared::ITEM_COST);
        alice.buy_item();

        // 5x1 damage against 4 hp destroys the only block
        let res = state.request_secondary("alice", Role::Attacker, "0_0_0");
        assert_eq!(res, 4);
        assert!(!state.cube().is_alive());
    }

    #[test]
    fn test_shield_path() {
        let state = test_state(1, 20, 600);
        state.register("bob", Role::Defender, None);
        state.register("alice", Role::Attacker, None);
        let bob = state.player("bob").unwrap();
        bob.gain_credits(shared::ITEM_COST);
        bob.buy_item();

        state.request_primary("alice", Role::Attacker, "0_0_0");
        let res = state.request_secondary("bob", Role::Defender, "0_0_0");
        assert_eq!(res, 1); // block was 1 below max, repair clamps to that
    }

    #[test]
    fn test_economy_dispatch_codes() {
        let state = test_state(2, 10, 600);
        state.register("alice", Role::Attacker, None);

        // 0 credits against a 10-credit level cost
        assert_eq!(state.level_primary("alice", Role::Attacker), -10);
        assert_eq!(state.level_speed("alice"), -10);
        assert_eq!(state.buy("alice", Role::Attacker), -shared::ITEM_COST);
        // Wrong-role buys are rejected outright
        assert_eq!(state.buy("alice", Role::Defender), 0);
        assert_eq!(state.boost("nobody"), 0);
    }

    #[test]
    fn test_leaderboard_ranking() {
        let state = test_state(2, 10, 600);
        for (name, score) in [("a", 5), ("b", 50), ("c", 20)] {
            state.register(
                name,
                Role::Attacker,
                Some(&RegisterExtras {
                    score,
                    credits: 0,
                    primary: 1,
                    secondary: 1,
                    items: 0,
                }),
            );
        }

        assert_eq!(state.leaderboard(), "1: b 50;2: c 20;3: a 5");
    }

    #[test]
    fn test_attackers_win_when_cube_falls() {
        let state = test_state(1, 5, 600);
        state.register("alice", Role::Attacker, None);
        state.player("alice").unwrap().set_rating(5);

        assert_eq!(state.evaluate_status(), VERDICT_RUNNING);
        state.request_primary("alice", Role::Attacker, "0_0_0");
        assert_eq!(state.evaluate_status(), VERDICT_ATTACKERS_WON);
        // Terminal verdicts never revert
        assert_eq!(state.evaluate_status(), VERDICT_ATTACKERS_WON);
    }

    #[test]
    fn test_defenders_win_on_timeout() {
        let state = GameState::new(
            "test",
            1,
            5,
            Duration::from_secs(0),
            temp_score_path("timeout"),
        );
        thread::sleep(Duration::from_millis(5));
        assert_eq!(state.evaluate_status(), VERDICT_DEFENDERS_WON);
    }

    #[test]
    fn test_crash_verdict_is_terminal_but_single() {
        let state = test_state(1, 5, 600);
        assert_eq!(state.mark_crashed(), VERDICT_CRASHED);
        // A later win evaluation cannot override it
        state.cube().remove(crate::block::BlockKey::new(0, 0, 0));
        assert_eq!(state.evaluate_status(), VERDICT_CRASHED);
    }

    #[test]
    fn test_score_export_written_once() {
        let path = temp_score_path("export");
        let state = GameState::new("test", 1, 1, Duration::from_secs(600), path.clone());
        state.register(
            "alice",
            Role::Attacker,
            Some(&RegisterExtras {
                score: 7,
                credits: 0,
                primary: 1,
                secondary: 1,
                items: 0,
            }),
        );

        state.request_primary("alice", Role::Attacker, "0_0_0");
        state.evaluate_status();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "alice 8\n");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_dispatch_wire_shapes() {
        let state = test_state(1, 10, 600);

        assert_eq!(state.dispatch("REGISTER-alice-1"), "REGISTER-1-alice-1");
        assert_eq!(state.dispatch("REGISTER-alice-1"), "REGISTER-0-alice-1");
        assert_eq!(state.dispatch("LOGIN-alice"), "LOGIN-1-alice-1");
        assert_eq!(state.dispatch("LOGIN-nobody"), "LOGIN-0-nobody--1");
        assert_eq!(state.dispatch("ATTACK-alice-0_0_0"), "ATTACK-(1)-alice");
        assert_eq!(state.dispatch("GETTARGETS"), "TARGETS-0_0_0:9");
        assert_eq!(state.dispatch("LVLATK-alice"), "LVLATK-(-9)-alice");
        assert_eq!(state.dispatch("BOOST-alice-1"), "BOOST-(0)");
        assert_eq!(state.dispatch("LOGOUT-alice"), "LOGOUT-1-alice");
        assert_eq!(state.dispatch("NOSUCHVERB-alice"), "");
        assert!(state.dispatch("GETEND").starts_with("GETEND-(0)-"));
        assert!(state.dispatch("GETPLAYER-alice").contains("alice"));
    }
}
