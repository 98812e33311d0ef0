use serde::{Deserialize, Serialize};

// Game balance
pub const STARTING_RATING: i64 = 1;
pub const STARTING_SPEED: i64 = 1;
pub const BASE_COOLDOWN_MS: u64 = 1000;
pub const BOOST_WINDOW_MS: u64 = 10_000;
pub const BOOST_MULTIPLIER: f64 = 0.5;
pub const BOOST_COST: i64 = 10;
pub const ITEM_COST: i64 = 25;
pub const BASE_LEVEL_COST: i64 = 10;
pub const BOMB_PRIMARY_MULTIPLIER: i64 = 5;
pub const BOMB_SPLASH_MULTIPLIER: i64 = 2;
pub const BOMB_SPLASH_TARGETS: usize = 4;
pub const BOMB_SAMPLE_ATTEMPTS: usize = 10;
pub const LEADERBOARD_SIZE: usize = 10;

// Verdict codes reported through GETEND
pub const VERDICT_RUNNING: i64 = 0;
pub const VERDICT_ATTACKERS_WON: i64 = 1;
pub const VERDICT_DEFENDERS_WON: i64 = -1;
pub const VERDICT_CRASHED: i64 = 666;

/// Cooldown window an actor must wait between uses of a rate-limited ability.
/// Higher speed shortens the window; an active boost halves it.
pub fn cooldown_window_ms(speed: i64, boosted: bool) -> f64 {
    let base = BASE_COOLDOWN_MS as f64 / speed.max(1) as f64;
    if boosted {
        base * BOOST_MULTIPLIER
    } else {
        base
    }
}

/// Player role. Wire code 1 for attackers, 0 for defenders.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Attacker,
    Defender,
}

impl Role {
    pub fn from_code(code: i64) -> Role {
        if code == 1 {
            Role::Attacker
        } else {
            Role::Defender
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Role::Attacker => 1,
            Role::Defender => 0,
        }
    }
}

/// Extended registration attributes used when reconstructing a player
/// from saved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterExtras {
    pub score: i64,
    pub credits: i64,
    pub primary: i64,
    pub secondary: i64,
    pub items: i64,
}

/// One client request, parsed from a `-`-separated line.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register {
        username: String,
        role: Role,
        extras: Option<RegisterExtras>,
    },
    Login {
        username: String,
    },
    Logout {
        username: String,
    },
    Attack {
        username: String,
        block: String,
    },
    Repair {
        username: String,
        block: String,
    },
    Bomb {
        username: String,
        block: String,
    },
    Shield {
        username: String,
        block: String,
    },
    BuyBomb {
        username: String,
    },
    BuyShield {
        username: String,
    },
    LevelAttack {
        username: String,
    },
    LevelRepair {
        username: String,
    },
    LevelSpeed {
        username: String,
        role: Role,
    },
    GetTargets,
    GetEnd,
    Boost {
        username: String,
        role: Role,
    },
    GetPlayer {
        username: String,
    },
}

impl Request {
    /// Parses one request line. Returns None for unknown verbs or malformed
    /// token counts; the server answers those with an empty response.
    pub fn parse(line: &str) -> Option<Request> {
        let tokens: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('-').collect();

        match (tokens[0], tokens.len()) {
            ("REGISTER", 3) => Some(Request::Register {
                username: tokens[1].to_string(),
                role: Role::from_code(tokens[2].parse().ok()?),
                extras: None,
            }),
            ("REGISTER", 8) => Some(Request::Register {
                username: tokens[1].to_string(),
                role: Role::from_code(tokens[2].parse().ok()?),
                extras: Some(RegisterExtras {
                    score: tokens[3].parse().ok()?,
                    credits: tokens[4].parse().ok()?,
                    primary: tokens[5].parse().ok()?,
                    secondary: tokens[6].parse().ok()?,
                    items: tokens[7].parse().ok()?,
                }),
            }),
            ("LOGIN", 2) => Some(Request::Login {
                username: tokens[1].to_string(),
            }),
            ("LOGOUT", 2) => Some(Request::Logout {
                username: tokens[1].to_string(),
            }),
            ("ATTACK", 3) => Some(Request::Attack {
                username: tokens[1].to_string(),
                block: tokens[2].to_string(),
            }),
            ("REPAIR", 3) => Some(Request::Repair {
                username: tokens[1].to_string(),
                block: tokens[2].to_string(),
            }),
            ("BOMB", 3) => Some(Request::Bomb {
                username: tokens[1].to_string(),
                block: tokens[2].to_string(),
            }),
            ("SHIELD", 3) => Some(Request::Shield {
                username: tokens[1].to_string(),
                block: tokens[2].to_string(),
            }),
            ("BUYBOMB", 2) => Some(Request::BuyBomb {
                username: tokens[1].to_string(),
            }),
            ("BUYSHIELD", 2) => Some(Request::BuyShield {
                username: tokens[1].to_string(),
            }),
            ("LVLATK", 2) => Some(Request::LevelAttack {
                username: tokens[1].to_string(),
            }),
            ("LVLREP", 2) => Some(Request::LevelRepair {
                username: tokens[1].to_string(),
            }),
            ("LVLSPD", 3) => Some(Request::LevelSpeed {
                username: tokens[1].to_string(),
                role: Role::from_code(tokens[2].parse().ok()?),
            }),
            ("GETTARGETS", 1) => Some(Request::GetTargets),
            ("GETEND", 1) => Some(Request::GetEnd),
            ("BOOST", 3) => Some(Request::Boost {
                username: tokens[1].to_string(),
                role: Role::from_code(tokens[2].parse().ok()?),
            }),
            ("GETPLAYER", 2) => Some(Request::GetPlayer {
                username: tokens[1].to_string(),
            }),
            _ => None,
        }
    }

    /// Renders the request as a wire line (used by the client).
    pub fn encode(&self) -> String {
        match self {
            Request::Register {
                username,
                role,
                extras: None,
            } => format!("REGISTER-{}-{}", username, role.code()),
            Request::Register {
                username,
                role,
                extras: Some(e),
            } => format!(
                "REGISTER-{}-{}-{}-{}-{}-{}-{}",
                username,
                role.code(),
                e.score,
                e.credits,
                e.primary,
                e.secondary,
                e.items
            ),
            Request::Login { username } => format!("LOGIN-{}", username),
            Request::Logout { username } => format!("LOGOUT-{}", username),
            Request::Attack { username, block } => format!("ATTACK-{}-{}", username, block),
            Request::Repair { username, block } => format!("REPAIR-{}-{}", username, block),
            Request::Bomb { username, block } => format!("BOMB-{}-{}", username, block),
            Request::Shield { username, block } => format!("SHIELD-{}-{}", username, block),
            Request::BuyBomb { username } => format!("BUYBOMB-{}", username),
            Request::BuyShield { username } => format!("BUYSHIELD-{}", username),
            Request::LevelAttack { username } => format!("LVLATK-{}", username),
            Request::LevelRepair { username } => format!("LVLREP-{}", username),
            Request::LevelSpeed { username, role } => {
                format!("LVLSPD-{}-{}", username, role.code())
            }
            Request::GetTargets => "GETTARGETS".to_string(),
            Request::GetEnd => "GETEND".to_string(),
            Request::Boost { username, role } => format!("BOOST-{}-{}", username, role.code()),
            Request::GetPlayer { username } => format!("GETPLAYER-{}", username),
        }
    }
}
