use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const DEFAULT_TICK_RATE: u32 = 120;
pub const STARTING_LIVES: u32 = 3;

/// Upper bound for a single framed message. Anything larger is treated as a
/// corrupt stream rather than an oversized snapshot.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    LoginRequest {
        username: String,
        password: String,
    },
    SignUpRequest {
        username: String,
        password: String,
    },
    RankRequest,
    PlayerInput {
        action: PlayerAction,
    },

    LoginResponse {
        success: bool,
        username: String,
    },
    SignUpResponse {
        success: bool,
        message: String,
    },
    RankResponse {
        entries: Vec<ScoreEntry>,
    },
    GameState {
        tick: u64,
        entities: Vec<EntityView>,
        score: u64,
        lives: u32,
        status: GameStatus,
    },
    Disconnected {
        reason: String,
    },
    Victory,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerAction {
    MoveLeft,
    MoveRight,
    Fire,
    Stop,
    SkipStage,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Player,
    Alien,
    ReflectAlien,
    Shot,
    AlienShot,
    Item,
    Meteor,
    Boss,
    Laser,
}

impl EntityKind {
    /// Kinds that move as one formation and reverse together at the edges.
    pub fn is_patrol(self) -> bool {
        matches!(self, EntityKind::Alien | EntityKind::ReflectAlien)
    }

    /// Kinds that kill a player ship on contact.
    pub fn is_lethal(self) -> bool {
        matches!(
            self,
            EntityKind::Alien
                | EntityKind::ReflectAlien
                | EntityKind::AlienShot
                | EntityKind::Boss
                | EntityKind::Laser
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Playing,
    GameOver,
    StageClear,
}

/// Render-side view of one entity as carried in a `GameState` packet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityView {
    pub id: u32,
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub hp: Option<i32>,
    pub frame: Option<u8>,
}

impl EntityView {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub username: String,
    pub score: u64,
}

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Strict overlap test; rectangles that merely touch do not collide.
pub fn check_collision(a: &Bounds, b: &Bounds) -> bool {
    a.x < b.x + b.width && a.x + a.width > b.x && a.y < b.y + b.height && a.y + a.height > b.y
}

/// Serializes a packet and prepends its big-endian `u32` length.
pub fn encode_frame(packet: &Packet) -> bincode::Result<Vec<u8>> {
    let payload = bincode::serialize(packet)?;
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn decode_payload(payload: &[u8]) -> bincode::Result<Packet> {
    bincode::deserialize(payload)
}

/// Reads one length-prefixed payload. IO errors and oversized frames are
/// connection faults; a payload that fails to decode is left to the caller.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}
