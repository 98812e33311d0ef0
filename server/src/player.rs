//! Player accounts and their cooldown-gated abilities
//!
//! A player is one struct tagged with a role rather than an inheritance
//! chain: the `rating` field reads as attack rating for attackers and repair
//! rating for defenders, `items` as bombs or shields. Every compound
//! check-and-update (cooldown gate, spend, level-up) runs under the player's
//! single stats mutex, so two concurrent requests from the same account can
//! never both pass a gate meant to admit one.

use crate::block::{Block, BlockKey, HitOutcome};
use log::debug;
use serde::{Deserialize, Serialize};
use shared::{
    cooldown_window_ms, RegisterExtras, Role, BASE_LEVEL_COST, BOMB_PRIMARY_MULTIPLIER,
    BOMB_SPLASH_MULTIPLIER, BOOST_COST, BOOST_WINDOW_MS, ITEM_COST, STARTING_RATING,
    STARTING_SPEED,
};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Result of a primary-ability attempt: the wire result code plus whether
/// this particular call destroyed the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbilityOutcome {
    pub code: i64,
    pub destroyed: bool,
}

/// Result of a bomb: total damage dealt plus every block this call destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BombOutcome {
    pub code: i64,
    pub destroyed: Vec<BlockKey>,
}

/// Plain-data view of a player's mutable stats. Carries no lock primitives,
/// so it is what gets persisted and what GETPLAYER renders.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub username: String,
    pub role: Role,
    pub score: i64,
    pub credits: i64,
    pub rating: i64,
    pub speed: i64,
    pub items: i64,
    pub rating_cost: i64,
    pub speed_cost: i64,
}

#[derive(Debug)]
struct PlayerStats {
    score: i64,
    credits: i64,
    logged_in: bool,
    rating: i64,
    speed: i64,
    items: i64,
    boost_active: bool,
    last_primary: Option<Instant>,
    last_secondary: Option<Instant>,
    last_boost: Option<Instant>,
    rating_cost: i64,
    speed_cost: i64,
}

impl PlayerStats {
    /// Boost self-expires once its window has elapsed; checked lazily on the
    /// next gated attempt rather than by a background timer.
    fn refresh_boost(&mut self) {
        if self.boost_active {
            if let Some(granted) = self.last_boost {
                if granted.elapsed().as_millis() as u64 > BOOST_WINDOW_MS {
                    self.boost_active = false;
                }
            }
        }
    }

    fn gate_open(&self, last: Option<Instant>) -> bool {
        match last {
            None => true,
            Some(at) => {
                let elapsed_ms = at.elapsed().as_secs_f64() * 1000.0;
                elapsed_ms >= cooldown_window_ms(self.speed, self.boost_active)
            }
        }
    }
}

/// A registered account, specialized into attacker or defender by its tag.
#[derive(Debug)]
pub struct Player {
    username: String,
    role: Role,
    stats: Mutex<PlayerStats>,
}

impl Player {
    pub fn new(username: &str, role: Role) -> Self {
        Self::with_attributes(username, role, 0, 0, STARTING_RATING, STARTING_SPEED, 0)
    }

    /// Registration with explicit attributes (the extended REGISTER form).
    pub fn from_extras(username: &str, role: Role, extras: &RegisterExtras) -> Self {
        Self::with_attributes(
            username,
            role,
            extras.score,
            extras.credits,
            extras.primary.max(STARTING_RATING),
            extras.secondary.max(STARTING_SPEED),
            extras.items.max(0),
        )
    }

    fn with_attributes(
        username: &str,
        role: Role,
        score: i64,
        credits: i64,
        rating: i64,
        speed: i64,
        items: i64,
    ) -> Self {
        Self {
            username: username.to_string(),
            role,
            stats: Mutex::new(PlayerStats {
                score,
                credits,
                logged_in: false,
                rating,
                speed,
                items,
                boost_active: false,
                last_primary: None,
                last_secondary: None,
                last_boost: None,
                rating_cost: BASE_LEVEL_COST,
                speed_cost: BASE_LEVEL_COST,
            }),
        }
    }

    /// Rebuilds a player from persisted data with a fresh lock, logged out
    /// and with all cooldowns cleared.
    pub fn from_record(record: &PlayerRecord) -> Self {
        let mut player = Self::with_attributes(
            &record.username,
            record.role,
            record.score,
            record.credits,
            record.rating,
            record.speed,
            record.items,
        );
        let stats = player.stats.get_mut().unwrap();
        stats.rating_cost = record.rating_cost.max(BASE_LEVEL_COST);
        stats.speed_cost = record.speed_cost.max(BASE_LEVEL_COST);
        player
    }

    pub fn record(&self) -> PlayerRecord {
        let stats = self.stats.lock().unwrap();
        PlayerRecord {
            username: self.username.clone(),
            role: self.role,
            score: stats.score,
            credits: stats.credits,
            rating: stats.rating,
            speed: stats.speed,
            items: stats.items,
            rating_cost: stats.rating_cost,
            speed_cost: stats.speed_cost,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn score(&self) -> i64 {
        self.stats.lock().unwrap().score
    }

    pub fn credits(&self) -> i64 {
        self.stats.lock().unwrap().credits
    }

    pub fn items(&self) -> i64 {
        self.stats.lock().unwrap().items
    }

    pub fn is_logged_in(&self) -> bool {
        self.stats.lock().unwrap().logged_in
    }

    /// Starts a session. Fails if one is already active.
    pub fn login(&self) -> bool {
        let mut stats = self.stats.lock().unwrap();
        if stats.logged_in {
            return false;
        }
        stats.logged_in = true;
        true
    }

    pub fn logout(&self) {
        self.stats.lock().unwrap().logged_in = false;
    }

    /// Attack (attacker) or repair (defender) one block with the player's
    /// rating. Returns 0 on a closed cooldown gate and -1 for a block that
    /// was already destroyed; otherwise the clamped effect, which is also
    /// the credit and score gain.
    pub fn primary(&self, block: &Block) -> AbilityOutcome {
        let mut stats = self.stats.lock().unwrap();
        stats.refresh_boost();
        if !stats.gate_open(stats.last_primary) {
            return AbilityOutcome {
                code: 0,
                destroyed: false,
            };
        }

        let outcome = match self.role {
            Role::Attacker => block.attack(stats.rating),
            Role::Defender => block.repair(stats.rating),
        };

        match outcome {
            HitOutcome::Applied { amount, destroyed } => {
                stats.last_primary = Some(Instant::now());
                stats.credits += amount;
                stats.score += amount;
                debug!(
                    "{} applied {} to block {} (destroyed: {})",
                    self.username,
                    amount,
                    block.key(),
                    destroyed
                );
                AbilityOutcome {
                    code: amount,
                    destroyed,
                }
            }
            HitOutcome::AlreadyDestroyed => AbilityOutcome {
                code: -1,
                destroyed: false,
            },
        }
    }

    /// Detonates one bomb: 5x rating on the chosen block, 2x rating on each
    /// splash block. Per-target failures are tolerated; the bomb is only
    /// consumed when at least one target was reachable, and the cooldown is
    /// consumed once no matter how many sub-targets were hit.
    pub fn bomb(&self, target: Option<Arc<Block>>, splash: Vec<Arc<Block>>) -> BombOutcome {
        let mut stats = self.stats.lock().unwrap();
        stats.refresh_boost();
        if !stats.gate_open(stats.last_secondary) {
            return BombOutcome {
                code: 0,
                destroyed: Vec::new(),
            };
        }
        if stats.items <= 0 {
            return BombOutcome {
                code: 0,
                destroyed: Vec::new(),
            };
        }
        if target.is_none() && splash.is_empty() {
            return BombOutcome {
                code: -1,
                destroyed: Vec::new(),
            };
        }

        stats.items -= 1;
        stats.last_secondary = Some(Instant::now());

        let mut total = 0;
        let mut destroyed = Vec::new();
        let hits = target
            .iter()
            .map(|b| (b, stats.rating * BOMB_PRIMARY_MULTIPLIER))
            .chain(
                splash
                    .iter()
                    .map(|b| (b, stats.rating * BOMB_SPLASH_MULTIPLIER)),
            );

        for (block, damage) in hits {
            if let HitOutcome::Applied {
                amount,
                destroyed: died,
            } = block.attack(damage)
            {
                total += amount;
                if died {
                    destroyed.push(block.key());
                }
            }
        }

        stats.credits += total;
        stats.score += total;
        debug!("{} bombed for {} total damage", self.username, total);
        BombOutcome {
            code: total,
            destroyed,
        }
    }

    /// Expends one shield to restore 5x repair rating on the target block.
    pub fn shield(&self, block: &Block) -> AbilityOutcome {
        let mut stats = self.stats.lock().unwrap();
        stats.refresh_boost();
        if !stats.gate_open(stats.last_secondary) {
            return AbilityOutcome {
                code: 0,
                destroyed: false,
            };
        }
        if stats.items <= 0 {
            return AbilityOutcome {
                code: 0,
                destroyed: false,
            };
        }

        match block.repair(stats.rating * BOMB_PRIMARY_MULTIPLIER) {
            HitOutcome::Applied { amount, .. } => {
                stats.items -= 1;
                stats.last_secondary = Some(Instant::now());
                stats.credits += amount;
                stats.score += amount;
                AbilityOutcome {
                    code: amount,
                    destroyed: false,
                }
            }
            HitOutcome::AlreadyDestroyed => AbilityOutcome {
                code: -1,
                destroyed: false,
            },
        }
    }

    /// Buys the boost modifier: fixed cost, sets the boost flag and restarts
    /// its window. Returns 1 on success, 0 on cooldown or missing funds.
    pub fn boost(&self) -> i64 {
        let mut stats = self.stats.lock().unwrap();
        stats.refresh_boost();
        if stats.boost_active {
            return 0;
        }
        if let Some(granted) = stats.last_boost {
            if (granted.elapsed().as_millis() as u64) < BOOST_WINDOW_MS {
                return 0;
            }
        }
        if stats.credits < BOOST_COST {
            return 0;
        }

        stats.credits -= BOOST_COST;
        stats.boost_active = true;
        stats.last_boost = Some(Instant::now());
        1
    }

    /// Buys one bomb or shield. Success returns the new item count; missing
    /// funds return the deficit as a negative value.
    pub fn buy_item(&self) -> i64 {
        let mut stats = self.stats.lock().unwrap();
        if stats.credits < ITEM_COST {
            return stats.credits - ITEM_COST;
        }
        stats.credits -= ITEM_COST;
        stats.items += 1;
        stats.items
    }

    /// Levels the primary rating. The cost doubles on every success; failure
    /// returns the deficit as a negative value and mutates nothing.
    pub fn level_primary(&self) -> i64 {
        let mut stats = self.stats.lock().unwrap();
        if stats.credits < stats.rating_cost {
            return stats.credits - stats.rating_cost;
        }
        stats.credits -= stats.rating_cost;
        stats.rating += 1;
        stats.rating_cost *= 2;
        stats.rating
    }

    /// Levels speed, same doubling rule as the primary rating.
    pub fn level_speed(&self) -> i64 {
        let mut stats = self.stats.lock().unwrap();
        if stats.credits < stats.speed_cost {
            return stats.credits - stats.speed_cost;
        }
        stats.credits -= stats.speed_cost;
        stats.speed += 1;
        stats.speed_cost *= 2;
        stats.speed
    }

    /// Administrative credit grant, used by state reconstruction.
    pub fn gain_credits(&self, amount: i64) {
        if amount > 0 {
            self.stats.lock().unwrap().credits += amount;
        }
    }

    /// Administrative overrides for state reconstruction. Non-positive
    /// values are ignored.
    pub fn set_rating(&self, value: i64) {
        if value > 0 {
            self.stats.lock().unwrap().rating = value;
        }
    }

    pub fn set_speed(&self, value: i64) {
        if value > 0 {
            self.stats.lock().unwrap().speed = value;
        }
    }

    pub fn set_items(&self, value: i64) {
        if value > 0 {
            self.stats.lock().unwrap().items = value;
        }
    }

    pub fn set_rating_cost(&self, value: i64) {
        if value > 0 {
            self.stats.lock().unwrap().rating_cost = value;
        }
    }

    pub fn set_speed_cost(&self, value: i64) {
        if value > 0 {
            self.stats.lock().unwrap().speed_cost = value;
        }
    }

    /// One-line status text for GETPLAYER.
    pub fn describe(&self) -> String {
        let stats = self.stats.lock().unwrap();
        let (rating_label, item_label) = match self.role {
            Role::Attacker => ("attack", "bombs"),
            Role::Defender => ("repair", "shields"),
        };
        format!(
            "{} role:{} score:{} credits:{} {}:{} speed:{} {}:{} boost:{}",
            self.username,
            self.role.code(),
            stats.score,
            stats.credits,
            rating_label,
            stats.rating,
            stats.speed,
            item_label,
            stats.items,
            stats.boost_active,
        )
    }

    /// Backdates ability timestamps so tests can reopen cooldown gates
    /// without sleeping.
    #[cfg(test)]
    pub(crate) fn rewind_cooldowns(&self, by: std::time::Duration) {
        let mut stats = self.stats.lock().unwrap();
        stats.last_primary = stats.last_primary.map(|t| t - by);
        stats.last_secondary = stats.last_secondary.map(|t| t - by);
        stats.last_boost = stats.last_boost.map(|t| t - by);
    }

    #[cfg(test)]
    pub(crate) fn boost_is_active(&self) -> bool {
        self.stats.lock().unwrap().boost_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKey;
    use std::thread;
    use std::time::Duration;

    fn attacker(credits: i64) -> Player {
        let player = Player::new("alice", Role::Attacker);
        player.gain_credits(credits);
        player
    }

    #[test]
    fn test_login_logout_cycle() {
        let player = Player::new("alice", Role::Attacker);
        assert!(!player.is_logged_in());
        assert!(player.login());
        assert!(!player.login()); // second login rejected
        player.logout();
        assert!(player.login());
    }

    #[test]
    fn test_primary_attack_gains_clamped_credit() {
        let player = attacker(0);
        player.set_rating(5);
        let block = Block::new(BlockKey::new(0, 0, 0), 3);

        // Rating 5 against 3 hp: only the real reduction is credited
        let outcome = player.primary(&block);
        assert_eq!(outcome.code, 3);
        assert!(outcome.destroyed);
        assert_eq!(player.credits(), 3);
        assert_eq!(player.score(), 3);
    }

    #[test]
    fn test_primary_respects_cooldown() {
        let player = attacker(0);
        let block = Block::new(BlockKey::new(0, 0, 0), 100);

        assert_eq!(player.primary(&block).code, 1);
        // Immediately again: gate closed, no mutation
        assert_eq!(player.primary(&block).code, 0);
        assert_eq!(block.hp(), 99);

        player.rewind_cooldowns(Duration::from_secs(2));
        assert_eq!(player.primary(&block).code, 1);
    }

    #[test]
    fn test_primary_on_destroyed_block_is_sentinel() {
        let player = attacker(0);
        player.set_rating(10);
        let block = Block::new(BlockKey::new(0, 0, 0), 10);

        assert_eq!(player.primary(&block).code, 10);
        player.rewind_cooldowns(Duration::from_secs(2));
        assert_eq!(
            player.primary(&block),
            AbilityOutcome {
                code: -1,
                destroyed: false,
            }
        );
    }

    #[test]
    fn test_defender_repairs() {
        let player = Player::new("bob", Role::Defender);
        player.set_rating(4);
        let block = Block::new(BlockKey::new(0, 0, 0), 10);
        block.attack(6);

        assert_eq!(player.primary(&block).code, 4);
        assert_eq!(block.hp(), 8);
        assert_eq!(player.credits(), 4);
    }

    #[test]
    fn test_cooldown_gate_admits_one_concurrent_caller() {
        let player = std::sync::Arc::new(attacker(0));
        let block = std::sync::Arc::new(Block::new(BlockKey::new(0, 0, 0), 1000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let player = std::sync::Arc::clone(&player);
                let block = std::sync::Arc::clone(&block);
                thread::spawn(move || player.primary(&block).code)
            })
            .collect();

        let total: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Exactly one call passed the gate within the window
        assert_eq!(total, 1);
        assert_eq!(block.hp(), 999);
    }

    #[test]
    fn test_bomb_requires_item() {
        let player = attacker(0);
        let block = Arc::new(Block::new(BlockKey::new(0, 0, 0), 100));

        let outcome = player.bomb(Some(Arc::clone(&block)), Vec::new());
        assert_eq!(outcome.code, 0);
        assert_eq!(block.hp(), 100);
        // No item was consumed and the cooldown stayed open
        assert_eq!(player.items(), 0);
    }

    #[test]
    fn test_bomb_damage_and_single_consumption() {
        let player = attacker(100);
        player.set_rating(2);
        assert!(player.buy_item() > 0);

        let target = Arc::new(Block::new(BlockKey::new(0, 0, 0), 100));
        let splash = vec![
            Arc::new(Block::new(BlockKey::new(0, 0, 1), 100)),
            Arc::new(Block::new(BlockKey::new(0, 0, 2), 100)),
        ];

        let outcome = player.bomb(Some(Arc::clone(&target)), splash.clone());
        // 5x2 on the target, 2x2 on each splash block
        assert_eq!(outcome.code, 10 + 4 + 4);
        assert_eq!(target.hp(), 90);
        assert_eq!(splash[0].hp(), 96);
        assert_eq!(player.items(), 0);
    }

    #[test]
    fn test_bomb_tolerates_dead_subtargets() {
        let player = attacker(100);
        player.set_rating(1);
        player.buy_item();

        let dead = Arc::new(Block::new(BlockKey::new(0, 0, 0), 1));
        dead.attack(1);
        let live = Arc::new(Block::new(BlockKey::new(0, 0, 1), 100));

        let outcome = player.bomb(Some(dead), vec![Arc::clone(&live)]);
        assert_eq!(outcome.code, 2);
        assert_eq!(live.hp(), 98);
        assert_eq!(player.items(), 0);
    }

    #[test]
    fn test_bomb_reports_destroyed_blocks() {
        let player = attacker(100);
        player.set_rating(2);
        player.buy_item();

        let target = Arc::new(Block::new(BlockKey::new(0, 0, 0), 5));
        let outcome = player.bomb(Some(target), Vec::new());
        assert_eq!(outcome.code, 5);
        assert_eq!(outcome.destroyed, vec![BlockKey::new(0, 0, 0)]);
    }

    #[test]
    fn test_bomb_without_reachable_targets() {
        let player = attacker(100);
        player.buy_item();

        let outcome = player.bomb(None, Vec::new());
        assert_eq!(outcome.code, -1);
        assert_eq!(player.items(), 1);
    }

    #[test]
    fn test_shield_restores_and_consumes() {
        let player = Player::new("bob", Role::Defender);
        player.gain_credits(100);
        player.set_rating(2);
        player.buy_item();

        let block = Block::new(BlockKey::new(0, 0, 0), 50);
        block.attack(20);

        let outcome = player.shield(&block);
        assert_eq!(outcome.code, 10);
        assert_eq!(block.hp(), 40);
        assert_eq!(player.items(), 0);
    }

    #[test]
    fn test_boost_costs_and_expires() {
        let player = attacker(BOOST_COST);

        assert_eq!(player.boost(), 1);
        assert!(player.boost_is_active());
        assert_eq!(player.credits(), 0);

        // Active boost cannot be stacked
        player.gain_credits(BOOST_COST);
        assert_eq!(player.boost(), 0);

        // After its window the flag lazily clears on the next gated attempt
        player.rewind_cooldowns(Duration::from_millis(BOOST_WINDOW_MS + 1000));
        let block = Block::new(BlockKey::new(0, 0, 0), 10);
        player.primary(&block);
        assert!(!player.boost_is_active());

        // And boosting becomes possible again
        assert_eq!(player.boost(), 1);
    }

    #[test]
    fn test_boost_without_funds_fails() {
        let player = attacker(BOOST_COST - 1);
        assert_eq!(player.boost(), 0);
        assert_eq!(player.credits(), BOOST_COST - 1);
    }

    #[test]
    fn test_buy_item_deficit() {
        let player = attacker(ITEM_COST - 5);
        assert_eq!(player.buy_item(), -5);
        assert_eq!(player.items(), 0);

        player.gain_credits(5);
        assert_eq!(player.buy_item(), 1);
        assert_eq!(player.credits(), 0);
    }

    #[test]
    fn test_level_cost_doubles() {
        let player = attacker(BASE_LEVEL_COST * 7); // 10 + 20 + 40 affordable

        assert_eq!(player.level_primary(), 2);
        assert_eq!(player.level_primary(), 3);
        assert_eq!(player.level_primary(), 4);
        // Fourth level needs 80, all credits are spent
        assert_eq!(player.level_primary(), -(BASE_LEVEL_COST * 8));
        assert_eq!(player.record().rating, 4);
    }

    #[test]
    fn test_level_up_without_funds_is_a_pure_rejection() {
        let player = attacker(0);
        assert_eq!(player.level_primary(), -BASE_LEVEL_COST);
        assert_eq!(player.level_speed(), -BASE_LEVEL_COST);

        let record = player.record();
        assert_eq!(record.rating, STARTING_RATING);
        assert_eq!(record.speed, STARTING_SPEED);
        assert_eq!(record.credits, 0);
    }

    #[test]
    fn test_record_roundtrip_resets_session_state() {
        let player = attacker(100);
        player.login();
        player.level_primary();
        player.buy_item();

        let restored = Player::from_record(&player.record());
        assert!(!restored.is_logged_in());
        assert_eq!(restored.record(), player.record());
    }

    #[test]
    fn test_setters_ignore_non_positive() {
        let player = attacker(0);
        player.set_rating(0);
        player.set_speed(-3);
        player.set_items(-1);

        let record = player.record();
        assert_eq!(record.rating, STARTING_RATING);
        assert_eq!(record.speed, STARTING_SPEED);
        assert_eq!(record.items, 0);
    }

    #[test]
    fn test_describe_mentions_role_fields() {
        let attacker = Player::new("alice", Role::Attacker);
        assert!(attacker.describe().contains("attack:"));
        assert!(attacker.describe().contains("bombs:"));

        let defender = Player::new("bob", Role::Defender);
        assert!(defender.describe().contains("repair:"));
        assert!(defender.describe().contains("shields:"));
    }
}
