//! The published message unit and the WebSocket opcode space it's built
//! from (RFC 6455 §5.2).

use crate::chunk::{self, Chunk};
use crate::error::SessionError;

/// RFC 6455 §5.2 opcodes this engine understands. Anything else is a
/// fatal protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
  Continuation = 0x0,
  Text = 0x1,
  Binary = 0x2,
  Close = 0x8,
  Ping = 0x9,
  Pong = 0xA,
}

impl OpCode {
  pub fn is_control(self) -> bool {
    matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
  }
}

impl TryFrom<u8> for OpCode {
  type Error = SessionError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0x0 => Ok(OpCode::Continuation),
      0x1 => Ok(OpCode::Text),
      0x2 => Ok(OpCode::Binary),
      0x8 => Ok(OpCode::Close),
      0x9 => Ok(OpCode::Ping),
      0xA => Ok(OpCode::Pong),
      _ => Err(SessionError::InvalidOpcode),
    }
  }
}

/// What kind of message a published [`Frame`] carries. `HttpBody` is
/// produced by the HTTP adapter; the rest are produced by the WebSocket
/// decoder once the opening (non-continuation) fragment's opcode is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
  HttpBody,
  WsPing,
  WsPong,
  WsClose,
  WsText,
  WsBinary,
}

impl FrameType {
  /// The opcode a *new* (non-continuation) WS message of this type opens
  /// with. Only meaningful for the `Ws*` variants; used by `build()`.
  pub(crate) fn opening_opcode(self) -> Option<OpCode> {
    match self {
      FrameType::WsPing => Some(OpCode::Ping),
      FrameType::WsPong => Some(OpCode::Pong),
      FrameType::WsClose => Some(OpCode::Close),
      FrameType::WsText => Some(OpCode::Text),
      FrameType::WsBinary => Some(OpCode::Binary),
      FrameType::HttpBody => None,
    }
  }

  pub(crate) fn from_opcode(opcode: OpCode) -> Option<Self> {
    match opcode {
      OpCode::Text => Some(FrameType::WsText),
      OpCode::Binary => Some(FrameType::WsBinary),
      OpCode::Close => Some(FrameType::WsClose),
      OpCode::Ping => Some(FrameType::WsPing),
      OpCode::Pong => Some(FrameType::WsPong),
      OpCode::Continuation => None,
    }
  }
}

/// A fully reassembled message: either one HTTP body accumulation or one
/// complete (all fragments joined, demasked) WebSocket message.
#[derive(Debug, Clone)]
pub struct Frame {
  pub frame_type: FrameType,
  chunks: Vec<Chunk>,
}

impl Frame {
  pub(crate) fn new(frame_type: FrameType) -> Self {
    Self { frame_type, chunks: Vec::new() }
  }

  pub(crate) fn chunks_mut(&mut self) -> &mut Vec<Chunk> {
    &mut self.chunks
  }

  pub fn chunks(&self) -> &[Chunk] {
    &self.chunks
  }

  /// Total payload length across every chunk.
  pub fn len(&self) -> usize {
    self.chunks.iter().map(Chunk::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Concatenates every chunk into one owned buffer.
  pub fn payload(&self) -> Vec<u8> {
    chunk::concat(&self.chunks)
  }
}
