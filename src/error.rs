use thiserror::Error;

/// Everything that can go wrong while driving a [`crate::Session`] or
/// [`crate::pull::PullParser`].
///
/// Each variant's `Display` text is a short, stable wire message, so a
/// caller that only looks at `session.error_msg` (or this error's
/// `to_string()`) gets a readable diagnostic without matching on variants.
#[derive(Debug, Error)]
pub enum SessionError {
  /// `process` was called with an empty buffer.
  #[error("invalid params")]
  InvalidParams,

  /// The embedded HTTP/1 parser rejected the byte stream. The payload is
  /// the parser's own error name, mirroring `http_errno_name()`.
  #[error("{0}")]
  HttpParse(String),

  /// `headers_complete` fired on an `Upgrade` request that lacked a
  /// `Sec-WebSocket-Version: 13` header.
  #[error("Invalid websocket version !")]
  InvalidWebSocketVersion,

  /// A frame's `MASK` bit didn't match the role/direction parity rule.
  #[error("masking-key not match")]
  MaskingKeyMismatch,

  /// `build` was asked to emit a frame type outside
  /// `{Ping, Pong, Close, Text, Binary}`.
  #[error("invalid frame type")]
  InvalidFrameType,

  /// A ping/pong/close payload exceeded 125 bytes.
  #[error("control frame require buf_len <= 125")]
  ControlFrameTooLarge,

  /// `build` was asked to encode more than `2^63 - 1` payload bytes.
  #[error("invalid payload length")]
  InvalidPayloadLength,

  /// A reserved bit was set without the meaning this engine understands
  /// (permessage-deflate is out of scope, so any RSV bit is a protocol
  /// violation here).
  #[error("reserved bits not zero")]
  ReservedBitsNotZero,

  /// A control frame (ping/pong/close) arrived with `FIN = 0`, or a
  /// ping/close frame's payload exceeded 125 bytes on the wire.
  #[error("control frame fragmented or too large")]
  ControlFrameFragmented,

  /// The frame header carried an opcode outside
  /// `{0x0, 0x1, 0x2, 0x8, 0x9, 0xA}`.
  #[error("invalid opcode")]
  InvalidOpcode,

  /// The input ended mid-frame or mid-header with no way to recover.
  #[error("unexpected end of stream")]
  UnexpectedEof,
}
