// wire.rs - Control protocol messages and stream framing
//
// Frame: [4-byte big-endian length][JSON Envelope]. Every request carries an
// `id` that its response echoes, so one connection can keep a long RunGame
// outstanding while polls and state changes go back and forth.

use conway::{Cell, RunState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServiceError;

/// Maximum frame size, shared across inbound and outbound paths.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024; // 256 MB

/// Payloads are read in steps of this size, so a length prefix alone never
/// reserves more memory than the peer has actually sent.
const READ_CHUNK: usize = 64 * 1024;

/// Errors from framing operations.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("malformed frame: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Start a simulation. `world` is `height` rows of `width` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRequest {
    pub width: usize,
    pub height: usize,
    pub threads: usize,
    pub turns: u32,
    pub world: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResponse {
    pub world: Vec<Vec<u8>>,
    pub completed_turns: u32,
    pub alive: Vec<Cell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCountResponse {
    pub turn: u32,
    pub alive: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardResponse {
    pub turn: u32,
    pub world: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStateResponse {
    pub turn: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    RunGame(GameRequest),
    GetAliveCount,
    GetBoard,
    ChangeState { state: RunState },
    ShutDown,
}

impl Request {
    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::RunGame(_) => "RunGame",
            Request::GetAliveCount => "GetAliveCount",
            Request::GetBoard => "GetBoard",
            Request::ChangeState { .. } => "ChangeState",
            Request::ShutDown => "ShutDown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Game(GameResponse),
    AliveCount(AliveCountResponse),
    Board(BoardResponse),
    StateChanged(ChangeStateResponse),
    ShutDownAck,
    Error(ServiceError),
}

/// A request or response tagged with its call id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

/// Encode `message` and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(stream: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(payload.len()));
    }
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
///
/// Returns `Ok(None)` when the peer closed the stream between frames. A
/// stream that ends inside a length prefix or payload is an I/O error.
pub async fn read_frame<R, T>(stream: &mut R, max_size: usize) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(truncated(filled, prefix.len()));
        }
        filled += n;
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_size {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = Vec::with_capacity(len.min(READ_CHUNK));
    while payload.len() < len {
        let want = (len - payload.len()).min(READ_CHUNK) as u64;
        let n = (&mut *stream).take(want).read_to_end(&mut payload).await?;
        if n == 0 {
            return Err(truncated(payload.len(), len));
        }
    }
    Ok(Some(serde_json::from_slice(&payload)?))
}

fn truncated(got: usize, expected: usize) -> FrameError {
    FrameError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("stream ended after {got} of {expected} bytes"),
    ))
}
