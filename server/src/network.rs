//! TCP line transport and the periodic win-condition evaluator
//!
//! One task per client session; each session carries exactly one request
//! line and gets exactly one response line back, matching the menu client's
//! connection-per-action model. Session faults are logged and isolated; the
//! shared state only ever sees `dispatch` calls.

use crate::state::GameState;
use log::{debug, error, info, warn};
use shared::VERDICT_RUNNING;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::interval;

/// Accepts client sessions and feeds their requests to the coordinator.
pub struct Server {
    listener: TcpListener,
    state: Arc<GameState>,
}

impl Server {
    pub async fn new(
        addr: &str,
        state: Arc<GameState>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Each connection is served by its own task so a slow or
    /// broken client never stalls the rest.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_session(stream, addr, state).await {
                            warn!("Session {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Reads one request line, dispatches it, writes one response line.
async fn handle_session(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<GameState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        debug!("Session {} closed without a request", addr);
        return Ok(());
    }

    debug!("{} -> {:?}", addr, line.trim_end());
    let response = state.dispatch(&line);
    debug!("{} <- {:?}", addr, response);

    write_half.write_all(response.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await?;
    Ok(())
}

/// Periodic win-condition evaluator. Runs independently of request handling
/// and only takes point-in-time reads; ends once the match has a verdict.
pub async fn run_status_ticker(state: Arc<GameState>, period: Duration) {
    let mut ticker = interval(period);
    // The first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let verdict = state.evaluate_status();
        if verdict != VERDICT_RUNNING {
            info!("Match over, verdict {}", verdict);
            break;
        }
        debug!(
            "{}s left, {} blocks standing",
            state.time_left().as_secs(),
            state.cube().live_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn score_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "blocksiege_network_{}_{}.txt",
            tag,
            std::process::id()
        ))
    }

    fn test_state(limit_secs: u64, tag: &str) -> Arc<GameState> {
        Arc::new(GameState::new(
            "test",
            2,
            10,
            Duration::from_secs(limit_secs),
            score_path(tag),
        ))
    }

    async fn send_request(addr: SocketAddr, line: &str) -> String {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(line.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();

        let mut reader = BufReader::new(read_half);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        response.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_single_session_round_trip() {
        let server = Server::new("127.0.0.1:0", test_state(600, "single"))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        assert_eq!(
            send_request(addr, "REGISTER-alice-1").await,
            "REGISTER-1-alice-1"
        );
        assert_eq!(send_request(addr, "LOGIN-alice").await, "LOGIN-1-alice-1");
        assert_eq!(
            send_request(addr, "ATTACK-alice-0_0_0").await,
            "ATTACK-(1)-alice"
        );
    }

    #[tokio::test]
    async fn test_malformed_request_yields_empty_response() {
        let server = Server::new("127.0.0.1:0", test_state(600, "malformed"))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        assert_eq!(send_request(addr, "NONSENSE-verb").await, "");
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let server = Server::new("127.0.0.1:0", test_state(600, "concurrent"))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut handles = Vec::new();
        for i in 0..8 {
            handles.push(tokio::spawn(async move {
                send_request(addr, &format!("REGISTER-user{}-1", i)).await
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(
                handle.await.unwrap(),
                format!("REGISTER-1-user{}-1", i)
            );
        }
    }

    #[tokio::test]
    async fn test_status_ticker_stops_on_verdict() {
        let state = test_state(0, "ticker");
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Must observe the expired clock and terminate
        tokio::time::timeout(
            Duration::from_secs(2),
            run_status_ticker(Arc::clone(&state), Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert_eq!(state.verdict(), shared::VERDICT_DEFENDERS_WON);
    }
}
