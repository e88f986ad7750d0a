//! The incremental WebSocket frame decoder: reads frame headers and
//! payload fragments out of an arbitrarily-split byte stream, reassembling
//! complete messages as fragments arrive.

use crate::chunk::{append_fixed, append_fixed_masked};
use crate::error::SessionError;
use crate::frame::{Frame, FrameType, OpCode};
use crate::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
  AwaitHeader,
  ReadPayload,
}

/// Fields decoded from the most recently parsed frame header.
#[derive(Debug, Clone, Copy, Default)]
struct HeaderScratch {
  fin: bool,
  opcode_raw: u8,
  masked: bool,
  mask_key: [u8; 4],
  payload_len: u64,
}

/// Incremental WS frame reader. One instance lives for the lifetime of a
/// session's WebSocket regime; it survives across `process()` calls,
/// picking up wherever the previous call left off.
pub(crate) struct WsDecoder {
  stage: Stage,
  header: HeaderScratch,
  fr_pread: u64,
  in_progress: Option<Frame>,
}

impl WsDecoder {
  pub fn new() -> Self {
    Self {
      stage: Stage::AwaitHeader,
      header: HeaderScratch::default(),
      fr_pread: 0,
      in_progress: None,
    }
  }

  /// Consumes as much of `buf` as forms complete frame headers/payload
  /// fragments, publishing fully-reassembled messages (FIN observed) onto
  /// `published` in arrival order. Returns the number of bytes consumed,
  /// which may be less than `buf.len()` when a partial frame header is
  /// still pending (never an error — that's simply "need more bytes").
  pub fn process(
    &mut self,
    role: Role,
    buf: &[u8],
    published: &mut Vec<Frame>,
  ) -> Result<usize, SessionError> {
    let mut nread = 0usize;

    loop {
      if self.stage == Stage::AwaitHeader {
        match self.try_read_header(role, &buf[nread..])? {
          Some(header_len) => nread += header_len,
          None => break,
        }
      }

      // Stage::ReadPayload. The in-progress frame is created as soon as we
      // enter this stage, even for a zero-length payload (e.g. an empty
      // ping), so it still gets published on FIN.
      if self.in_progress.is_none() {
        let ty = FrameType::from_opcode(
          OpCode::try_from(self.header.opcode_raw)
            .expect("opcode validated in try_read_header"),
        )
        .unwrap_or(FrameType::WsBinary);
        self.in_progress = Some(Frame::new(ty));
      }

      let remaining_in_buf = &buf[nread..];
      let payload_remaining =
        (self.header.payload_len - self.fr_pread) as usize;
      let take = remaining_in_buf.len().min(payload_remaining);

      if take > 0 {
        let frame = self.in_progress.as_mut().unwrap();
        let slice = &remaining_in_buf[..take];
        if self.header.masked {
          append_fixed_masked(
            frame.chunks_mut(),
            slice,
            self.header.mask_key,
            self.fr_pread as usize,
          );
        } else {
          append_fixed(frame.chunks_mut(), slice);
        }

        nread += take;
        self.fr_pread += take as u64;
      }

      if self.fr_pread == self.header.payload_len {
        self.stage = Stage::AwaitHeader;
        if self.header.fin {
          if let Some(frame) = self.in_progress.take() {
            published.push(frame);
          }
          break;
        }
        // Continuation expected: keep the same in-progress frame and loop
        // back to read the next fragment's header (Ok(None) above handles
        // running out of input).
        continue;
      } else {
        // Ran out of input mid-payload; wait for more.
        break;
      }
    }

    Ok(nread)
  }

  /// Attempts to parse one frame header from the front of `buf`. Returns
  /// `Ok(Some(header_len))` and transitions to `ReadPayload` on success,
  /// `Ok(None)` if `buf` doesn't yet hold a complete header (nothing is
  /// consumed), or `Err` on a fatal protocol violation.
  fn try_read_header(
    &mut self,
    role: Role,
    buf: &[u8],
  ) -> Result<Option<usize>, SessionError> {
    if buf.len() < 2 {
      return Ok(None);
    }

    let fin = buf[0] & 0b1000_0000 != 0;
    let rsv = buf[0] & 0b0111_0000;
    if rsv != 0 {
      return Err(SessionError::ReservedBitsNotZero);
    }
    let opcode_raw = buf[0] & 0b0000_1111;
    let opcode = OpCode::try_from(opcode_raw)?;
    if opcode == OpCode::Continuation && self.in_progress.is_none() {
      return Err(SessionError::InvalidOpcode);
    }

    let masked = buf[1] & 0b1000_0000 != 0;
    let plen7 = buf[1] & 0b0111_1111;

    let extra = match plen7 {
      127 => 8,
      126 => 2,
      _ => 0,
    };

    let header_len = 2 + extra + if masked { 4 } else { 0 };
    if buf.len() < header_len {
      return Ok(None);
    }

    // RFC 6455 mask parity: a server MUST receive masked client frames;
    // a client MUST receive unmasked server frames.
    if masked != (role == Role::Server) {
      return Err(SessionError::MaskingKeyMismatch);
    }

    let payload_len: u64 = match extra {
      8 => u64::from_be_bytes(buf[2..10].try_into().unwrap()),
      2 => u16::from_be_bytes(buf[2..4].try_into().unwrap()) as u64,
      _ => plen7 as u64,
    };

    if opcode.is_control() {
      if !fin {
        return Err(SessionError::ControlFrameFragmented);
      }
      if payload_len > 125 {
        return Err(SessionError::ControlFrameFragmented);
      }
    }

    let mask_key = if masked {
      buf[header_len - 4..header_len].try_into().unwrap()
    } else {
      [0u8; 4]
    };

    self.header = HeaderScratch { fin, opcode_raw, masked, mask_key, payload_len };
    self.fr_pread = 0;
    self.stage = Stage::ReadPayload;

    Ok(Some(header_len))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mask_bytes(data: &[u8], key: [u8; 4]) -> Vec<u8> {
    data.iter().enumerate().map(|(i, b)| b ^ key[i % 4]).collect()
  }

  #[test]
  fn single_unmasked_text_frame_fails_parity_on_server() {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let input = [0x81, 0x05, b'H', b'e', b'l', b'l', b'o'];
    let err = dec.process(Role::Server, &input, &mut published).unwrap_err();
    assert!(matches!(err, SessionError::MaskingKeyMismatch));
  }

  #[test]
  fn single_masked_text_frame_on_server() {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let key = [0x37, 0xfa, 0x21, 0x3d];
    let masked = mask_bytes(b"Hello", key);
    let mut input = vec![0x81, 0x85];
    input.extend_from_slice(&key);
    input.extend_from_slice(&masked);

    let n = dec.process(Role::Server, &input, &mut published).unwrap();
    assert_eq!(n, input.len());
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].frame_type, FrameType::WsText);
    assert_eq!(published[0].payload(), b"Hello");
  }

  #[test]
  fn fragmented_binary_across_two_reads() {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let key1 = [1, 2, 3, 4];
    let key2 = [5, 6, 7, 8];
    let payload = b"abcde";

    let part1 = mask_bytes(&payload[0..3], key1);
    let mut first = vec![0x02, 0x83];
    first.extend_from_slice(&key1);
    first.extend_from_slice(&part1);

    let part2 = mask_bytes(&payload[3..5], key2);
    let mut second = vec![0x80, 0x82];
    second.extend_from_slice(&key2);
    second.extend_from_slice(&part2);

    let n1 = dec.process(Role::Server, &first, &mut published).unwrap();
    assert_eq!(n1, first.len());
    assert!(published.is_empty());

    let n2 = dec.process(Role::Server, &second, &mut published).unwrap();
    assert_eq!(n2, second.len());
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].frame_type, FrameType::WsBinary);
    assert_eq!(published[0].payload(), payload);
  }

  #[test]
  fn first_byte_only_needs_more_data() {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let n = dec.process(Role::Server, &[0x81], &mut published).unwrap();
    assert_eq!(n, 0);
    assert!(published.is_empty());
  }

  #[test]
  fn control_frame_fin_zero_is_fatal() {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let input = [0x08, 0x80, 0, 0, 0, 0];
    let err = dec.process(Role::Server, &input, &mut published).unwrap_err();
    assert!(matches!(err, SessionError::ControlFrameFragmented));
  }

  #[test]
  fn unknown_opcode_is_fatal() {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let input = [0x83, 0x80, 0, 0, 0, 0];
    let err = dec.process(Role::Server, &input, &mut published).unwrap_err();
    assert!(matches!(err, SessionError::InvalidOpcode));
  }
}
