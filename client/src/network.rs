use log::{debug, info, warn};
use shared::{decode_payload, read_frame, write_packet, Packet, PlayerAction, ScoreEntry};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How long a one-shot request waits for its answer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn is_reply(packet: &Packet) -> bool {
    matches!(
        packet,
        Packet::LoginResponse { .. }
            | Packet::SignUpResponse { .. }
            | Packet::RankResponse { .. }
            | Packet::Disconnected { .. }
    )
}

/// Opens a connection, sends exactly one request, waits for its reply and
/// closes. Snapshots that arrive first (a single-mode server binds the first
/// connection to a ship) are skipped.
pub async fn request_once(addr: &str, request: &Packet) -> Result<Packet, BoxError> {
    let mut stream = TcpStream::connect(addr).await?;
    write_packet(&mut stream, request).await?;

    let reply = timeout(REQUEST_TIMEOUT, async {
        loop {
            let packet = decode_payload(&read_frame(&mut stream).await?)?;
            if is_reply(&packet) {
                return Ok::<Packet, BoxError>(packet);
            }
            debug!("Skipping {:?} while waiting for a reply", packet);
        }
    })
    .await??;

    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown after request failed: {}", e);
    }
    Ok(reply)
}

pub async fn sign_up(
    addr: &str,
    username: &str,
    password: &str,
) -> Result<(bool, String), BoxError> {
    let request = Packet::SignUpRequest {
        username: username.to_string(),
        password: password.to_string(),
    };
    match request_once(addr, &request).await? {
        Packet::SignUpResponse { success, message } => Ok((success, message)),
        other => Err(format!("unexpected reply to signup: {:?}", other).into()),
    }
}

pub async fn login(addr: &str, username: &str, password: &str) -> Result<bool, BoxError> {
    let request = Packet::LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    };
    match request_once(addr, &request).await? {
        Packet::LoginResponse { success, .. } => Ok(success),
        other => Err(format!("unexpected reply to login: {:?}", other).into()),
    }
}

pub async fn fetch_rankings(addr: &str) -> Result<Vec<ScoreEntry>, BoxError> {
    match request_once(addr, &Packet::RankRequest).await? {
        Packet::RankResponse { entries } => Ok(entries),
        other => Err(format!("unexpected reply to rank request: {:?}", other).into()),
    }
}

/// Long-lived session used for actual play.
pub struct GameConnection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl GameConnection {
    pub async fn connect(addr: &str) -> Result<Self, BoxError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", addr);

        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), BoxError> {
        write_packet(&mut self.writer, packet).await?;
        Ok(())
    }

    pub async fn send_action(&mut self, action: PlayerAction) -> Result<(), BoxError> {
        self.send(&Packet::PlayerInput { action }).await
    }

    /// Waits for the next packet. A cleanly closed stream is an error too,
    /// since the server never closes a healthy session.
    pub async fn next_packet(&mut self) -> Result<Packet, BoxError> {
        let frame = read_frame(&mut self.reader).await?;
        Ok(decode_payload(&frame)?)
    }

    /// Logs in on this connection, skipping snapshots until the answer
    /// arrives.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<bool, BoxError> {
        self.send(&Packet::LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;

        loop {
            match self.next_packet().await? {
                Packet::LoginResponse { success, .. } => return Ok(success),
                Packet::Disconnected { reason } => {
                    warn!("Disconnected during login: {}", reason);
                    return Err(reason.into());
                }
                _ => continue,
            }
        }
    }

    pub async fn close(mut self) -> Result<(), BoxError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameStatus, ScoreEntry};

    #[test]
    fn test_reply_classification() {
        assert!(is_reply(&Packet::RankResponse {
            entries: vec![ScoreEntry {
                username: "ace".to_string(),
                score: 3
            }]
        }));
        assert!(is_reply(&Packet::Disconnected {
            reason: "Server full".to_string()
        }));
        assert!(!is_reply(&Packet::Victory));
        assert!(!is_reply(&Packet::GameState {
            tick: 1,
            entities: vec![],
            score: 0,
            lives: 3,
            status: GameStatus::Playing,
        }));
    }

    #[tokio::test]
    async fn test_request_once_against_canned_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream).await.unwrap();
            assert_eq!(decode_payload(&frame).unwrap(), Packet::RankRequest);

            write_packet(&mut stream, &Packet::Victory).await.unwrap();
            write_packet(&mut stream, &Packet::RankResponse { entries: vec![] })
                .await
                .unwrap();
        });

        let entries = fetch_rankings(&addr).await.unwrap();
        assert!(entries.is_empty());
    }
}
