//! Interactive text menus driving the wire protocol.

use crate::network::{parse_result, Connection};
use shared::{Request, Role, VERDICT_ATTACKERS_WON, VERDICT_DEFENDERS_WON, VERDICT_RUNNING};
use std::io::{self, Write};

/// One player's interactive session.
pub struct Session {
    connection: Connection,
    username: Option<String>,
    role: Role,
}

impl Session {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            username: None,
            role: Role::Attacker,
        }
    }

    /// Menu loop: account menu while signed out, action menu while signed
    /// in. Returns once the player quits.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let keep_going = match self.username.clone() {
                None => self.account_menu().await?,
                Some(username) => self.action_menu(&username).await?,
            };
            if !keep_going {
                break;
            }
        }

        println!("Thanks for playing, exiting");
        Ok(())
    }

    async fn account_menu(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        println!();
        println!("Welcome to blocksiege");
        println!("1. Sign up");
        println!("2. Sign in");
        println!("3. Quit");

        match prompt("> ").as_str() {
            "1" => {
                let role = match self.pick_role() {
                    Some(role) => role,
                    None => return Ok(true),
                };
                let username = prompt("Enter your username: ");
                if username.is_empty() || username.contains('-') {
                    println!("Usernames must be non-empty and free of '-'");
                    return Ok(true);
                }

                let response = self
                    .connection
                    .send(&Request::Register {
                        username: username.clone(),
                        role,
                        extras: None,
                    })
                    .await?;
                if response.starts_with("REGISTER-1") {
                    println!("Registered {}", username);
                    self.sign_in(&username).await?;
                } else {
                    println!("Username already taken");
                }
                Ok(true)
            }
            "2" => {
                let username = prompt("Enter your username: ");
                self.sign_in(&username).await?;
                Ok(true)
            }
            "3" => Ok(false),
            _ => Ok(true),
        }
    }

    fn pick_role(&self) -> Option<Role> {
        println!("Select your role:");
        println!("1. Attacker");
        println!("2. Defender");
        println!("3. Back to menu");
        match prompt("> ").as_str() {
            "1" => Some(Role::Attacker),
            "2" => Some(Role::Defender),
            _ => None,
        }
    }

    async fn sign_in(&mut self, username: &str) -> Result<(), Box<dyn std::error::Error>> {
        let response = self
            .connection
            .send(&Request::Login {
                username: username.to_string(),
            })
            .await?;

        // LOGIN-{0|1}-username-role
        let tokens: Vec<&str> = response.split('-').collect();
        if tokens.len() >= 4 && tokens[1] == "1" {
            self.username = Some(username.to_string());
            self.role = Role::from_code(tokens[3].parse().unwrap_or(0));
            println!("Signed in as {} ({:?})", username, self.role);
        } else {
            println!("Could not sign in, please retry");
        }
        Ok(())
    }

    async fn action_menu(&mut self, username: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let (primary, secondary, item) = match self.role {
            Role::Attacker => ("Attack a block", "Bomb a block", "bomb"),
            Role::Defender => ("Repair a block", "Shield a block", "shield"),
        };

        println!();
        println!("**** {} ({:?}) ****", username, self.role);
        println!("1. List targets");
        println!("2. {}", primary);
        println!("3. {}", secondary);
        println!("4. Buy a {}", item);
        println!("5. Level up rating");
        println!("6. Level up speed");
        println!("7. Boost");
        println!("8. My stats");
        println!("9. Leaderboard / game status");
        println!("10. Sign out");

        let username = username.to_string();
        match prompt("> ").as_str() {
            "1" => self.show_targets().await?,
            "2" => self.use_primary(&username).await?,
            "3" => self.use_secondary(&username).await?,
            "4" => {
                let request = match self.role {
                    Role::Attacker => Request::BuyBomb {
                        username: username.clone(),
                    },
                    Role::Defender => Request::BuyShield {
                        username: username.clone(),
                    },
                };
                let response = self.connection.send(&request).await?;
                match parse_result(&response) {
                    Some(n) if n > 0 => println!("Purchased, you now hold {}", n),
                    Some(n) => println!("Not enough credits, you need {} more", -n),
                    None => println!("Purchase failed"),
                }
            }
            "5" => {
                let request = match self.role {
                    Role::Attacker => Request::LevelAttack {
                        username: username.clone(),
                    },
                    Role::Defender => Request::LevelRepair {
                        username: username.clone(),
                    },
                };
                report_level(&self.connection.send(&request).await?, "rating");
            }
            "6" => {
                let response = self
                    .connection
                    .send(&Request::LevelSpeed {
                        username: username.clone(),
                        role: self.role,
                    })
                    .await?;
                report_level(&response, "speed");
            }
            "7" => {
                let response = self
                    .connection
                    .send(&Request::Boost {
                        username: username.clone(),
                        role: self.role,
                    })
                    .await?;
                if parse_result(&response) == Some(1) {
                    println!("Boost active, cooldowns halved");
                } else {
                    println!("Cannot boost yet");
                }
            }
            "8" => {
                let response = self
                    .connection
                    .send(&Request::GetPlayer {
                        username: username.clone(),
                    })
                    .await?;
                println!("{}", response.trim_start_matches("GETPLAYER-"));
            }
            "9" => self.show_status().await?,
            "10" => {
                self.connection
                    .send(&Request::Logout {
                        username: username.clone(),
                    })
                    .await?;
                self.username = None;
                println!("Signed out");
            }
            _ => {}
        }
        Ok(true)
    }

    async fn show_targets(&self) -> Result<(), Box<dyn std::error::Error>> {
        let response = self.connection.send(&Request::GetTargets).await?;
        let targets = response.trim_start_matches("TARGETS-");
        if targets.is_empty() {
            println!("No blocks left");
            return Ok(());
        }
        println!("Live blocks (coordinate:hp):");
        for target in targets.split(',') {
            println!("  {}", target);
        }
        Ok(())
    }

    async fn use_primary(&self, username: &str) -> Result<(), Box<dyn std::error::Error>> {
        let block = prompt("Block coordinates (X_Y_Z): ");
        let request = match self.role {
            Role::Attacker => Request::Attack {
                username: username.to_string(),
                block,
            },
            Role::Defender => Request::Repair {
                username: username.to_string(),
                block,
            },
        };

        let response = self.connection.send(&request).await?;
        match parse_result(&response) {
            Some(n) if n > 0 => println!("Success, {} hit points", n),
            Some(0) => println!("On cooldown, wait a moment"),
            _ => println!("Failed, the block may be gone"),
        }
        Ok(())
    }

    async fn use_secondary(&self, username: &str) -> Result<(), Box<dyn std::error::Error>> {
        let block = prompt("Block coordinates (X_Y_Z): ");
        let request = match self.role {
            Role::Attacker => Request::Bomb {
                username: username.to_string(),
                block,
            },
            Role::Defender => Request::Shield {
                username: username.to_string(),
                block,
            },
        };

        let response = self.connection.send(&request).await?;
        match parse_result(&response) {
            Some(n) if n > 0 => println!("Success, {} total hit points", n),
            Some(0) => println!("No item available or still on cooldown"),
            _ => println!("Failed, the block may be gone"),
        }
        Ok(())
    }

    async fn show_status(&self) -> Result<(), Box<dyn std::error::Error>> {
        let response = self.connection.send(&Request::GetEnd).await?;
        match parse_result(&response) {
            Some(VERDICT_RUNNING) => println!("Game is still running"),
            Some(VERDICT_ATTACKERS_WON) => println!("Attackers won!"),
            Some(VERDICT_DEFENDERS_WON) => println!("Defenders won!"),
            Some(_) => println!("The match crashed"),
            None => println!("No status available"),
        }

        if let Some((_, board)) = response.split_once(")-") {
            println!("Leaderboard:");
            for entry in board.split(';').filter(|e| !e.is_empty()) {
                println!("  {}", entry);
            }
        }
        Ok(())
    }
}

fn report_level(response: &str, what: &str) {
    match parse_result(response) {
        Some(n) if n > 0 => println!("{} is now {}", what, n),
        Some(n) if n < 0 => println!("Not enough credits, you need {} more", -n),
        _ => println!("Level up failed"),
    }
}

/// Blocking stdin prompt; trims the newline.
fn prompt(text: &str) -> String {
    print!("{}", text);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}
