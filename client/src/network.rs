//! One-connection-per-request transport to the game server.

use log::debug;
use shared::Request;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Sends requests to the server, opening a fresh connection per action the
/// way the server's one-line sessions expect.
pub struct Connection {
    addr: String,
}

impl Connection {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
        }
    }

    pub async fn send(&self, request: &Request) -> Result<String, Box<dyn std::error::Error>> {
        let line = request.encode();
        debug!("-> {}", line);

        let stream = TcpStream::connect(&self.addr).await?;
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(line.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        let mut response = String::new();
        reader.read_line(&mut response).await?;
        let response = response.trim_end().to_string();
        debug!("<- {}", response);
        Ok(response)
    }
}

/// Extracts the numeric result code from responses shaped like
/// `VERB-(code)-username`.
pub fn parse_result(response: &str) -> Option<i64> {
    let start = response.find('(')? + 1;
    let end = response.find(')')?;
    response.get(start..end)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_codes() {
        assert_eq!(parse_result("ATTACK-(5)-alice"), Some(5));
        assert_eq!(parse_result("LVLATK-(-10)-alice"), Some(-10));
        assert_eq!(parse_result("BOOST-(1)"), Some(1));
        assert_eq!(parse_result("REGISTER-1-alice-1"), None);
        assert_eq!(parse_result(""), None);
    }
}
