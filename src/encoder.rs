//! Builds outgoing WebSocket frames: fragmentation across a caller-chosen
//! maximum frame size, client-side masking, and length-class encoding.

use crate::chunk::Chunk;
use crate::error::SessionError;
use crate::frame::{FrameType, OpCode};
use crate::prng::Prng;
use crate::Role;

/// Chooses this fragment's header length and payload length given how
/// much of the message is left and the caller's `max_frame_size`. Only
/// used for data (text/binary) frames — control frames are never
/// fragmented and bypass this entirely.
///
/// Starts from a header length of `2 + (4 if client else 0)` and grows it
/// to fit the length class the remaining payload needs: 7-bit length if it
/// fits in 125 bytes, else a 16-bit extended length, else 64-bit. The
/// returned `plen` always fits within the length class `hlen` implies —
/// growing to a bigger header only happens when that header actually buys
/// a payload large enough to need it; otherwise this falls back to the
/// smaller header capped at its own maximum, so `encode_fragment` can
/// trust `hlen` instead of re-deriving the class from `plen`. Picking the
/// class from `plen` alone (as the data length at encode time) can
/// disagree with whatever class sized the header — e.g. a caller-supplied
/// `max_frame_size` that leaves only 124 bytes of room once a 16-bit
/// header is subtracted still produces a `plen` that fits in 7 bits, so
/// choosing the smaller header for those same 124 bytes is both correct
/// and avoids the header/payload size mismatch that re-deriving from
/// `plen` alone would produce.
fn fragment_sizing(
  remaining_len: usize,
  max_frame_size: usize,
  base_hlen: usize,
) -> Result<(usize, usize), SessionError> {
  if max_frame_size <= base_hlen {
    return Err(SessionError::InvalidParams);
  }

  let plen7 = remaining_len.min(max_frame_size - base_hlen);
  if plen7 <= 125 {
    return Ok((base_hlen, plen7));
  }

  let hlen16 = base_hlen + 2;
  if max_frame_size > hlen16 {
    let plen16 = remaining_len.min(max_frame_size - hlen16);
    if plen16 > u16::MAX as usize {
      let hlen64 = base_hlen + 8;
      if max_frame_size > hlen64 {
        let plen64 = remaining_len.min(max_frame_size - hlen64);
        if plen64 > u16::MAX as usize {
          return Ok((hlen64, plen64));
        }
      }
      // The 64-bit tier isn't available or doesn't buy anything past the
      // 16-bit tier's own ceiling: cap there instead.
      return Ok((hlen16, u16::MAX as usize));
    }
    if plen16 > 125 {
      return Ok((hlen16, plen16));
    }
  }

  // Neither extended tier actually yields a payload large enough to need
  // its own header (max_frame_size sits just past the 7-bit boundary):
  // fall back to the 7-bit tier capped at its max.
  Ok((base_hlen, 125))
}

/// Builds one or more on-wire WebSocket frames encoding `payload` as
/// `frame_type`. `prng` is only consulted when `role` is `Client` (masking
/// applies); server-role callers may pass `None`.
pub(crate) fn build(
  role: Role,
  mut prng: Option<&mut Prng>,
  frame_type: FrameType,
  rsv_bits: u8,
  max_frame_size: usize,
  payload: &[u8],
) -> Result<Vec<Chunk>, SessionError> {
  if max_frame_size == 0 {
    return Err(SessionError::InvalidParams);
  }

  let opening_opcode =
    frame_type.opening_opcode().ok_or(SessionError::InvalidFrameType)?;
  let is_control = opening_opcode.is_control();

  if !is_control && payload.is_empty() {
    return Err(SessionError::InvalidParams);
  }
  if is_control && payload.len() > 125 {
    return Err(SessionError::ControlFrameTooLarge);
  }
  // RFC 6455 caps the payload length field at 2^63 - 1 (the high bit of
  // the 64-bit extended length is reserved and must be zero).
  if payload.len() as u128 > (1u128 << 63) - 1 {
    return Err(SessionError::InvalidPayloadLength);
  }

  let masking = role == Role::Client;
  let base_hlen = 2 + if masking { 4 } else { 0 };

  if is_control {
    // Never fragmented, even if max_frame_size can't hold the worst-case
    // data frame header: a control payload is always <= 125 bytes, so it
    // always fits in the minimal 7-bit-length header.
    let frame = encode_fragment(
      opening_opcode,
      true,
      rsv_bits,
      masking,
      prng.as_deref_mut(),
      base_hlen,
      payload,
    );
    return Ok(vec![Chunk::from_exact(&frame)]);
  }

  let mut chunks = Vec::new();
  let mut remaining = payload;
  let mut index = 0usize;

  loop {
    let (hlen, plen) =
      fragment_sizing(remaining.len(), max_frame_size, base_hlen)?;
    if plen == 0 {
      // max_frame_size leaves no room for any payload bytes at all.
      return Err(SessionError::InvalidParams);
    }

    let data = &remaining[..plen];
    let fin = plen == remaining.len();
    let opcode =
      if index == 0 { opening_opcode } else { OpCode::Continuation };

    let frame = encode_fragment(
      opcode,
      fin,
      rsv_bits,
      masking,
      prng.as_deref_mut(),
      hlen,
      data,
    );
    chunks.push(Chunk::from_exact(&frame));

    remaining = &remaining[plen..];
    index += 1;

    if fin {
      break;
    }
  }

  Ok(chunks)
}

/// Encodes one on-wire frame: header (FIN/RSV/opcode/MASK/length[/mask
/// key]) followed by the (optionally masked) payload.
///
/// The length field's class (7-bit/16-bit/64-bit) is derived from `hlen`,
/// not from `data.len()`: `hlen` is the header length the caller already
/// committed to (via `fragment_sizing` for data frames, or the fixed
/// minimal header for control frames), and `data.len()` always fits the
/// class that `hlen` implies. Re-deriving the class from `data.len()`
/// independently of `hlen` can disagree with it and leave the allocated
/// buffer's extra length-field bytes as trailing zero padding on the wire.
fn encode_fragment(
  opcode: OpCode,
  fin: bool,
  rsv_bits: u8,
  masking: bool,
  prng: Option<&mut Prng>,
  hlen: usize,
  data: &[u8],
) -> Vec<u8> {
  let plen = data.len();
  let mut out = vec![0u8; hlen + plen];

  out[0] = ((fin as u8) << 7) | ((rsv_bits & 0x7) << 4) | (opcode as u8);
  out[1] = (masking as u8) << 7;

  let base_hlen = 2 + if masking { 4 } else { 0 };
  let extra = hlen - base_hlen;

  let mut pos = 2;
  match extra {
    0 => {
      debug_assert!(plen <= 125);
      out[1] |= plen as u8;
    }
    2 => {
      debug_assert!(plen > 125 && plen <= u16::MAX as usize);
      out[1] |= 126;
      out[pos..pos + 2].copy_from_slice(&(plen as u16).to_be_bytes());
      pos += 2;
    }
    8 => {
      debug_assert!(plen > u16::MAX as usize);
      out[1] |= 127;
      out[pos..pos + 8].copy_from_slice(&(plen as u64).to_be_bytes());
      pos += 8;
    }
    _ => unreachable!("hlen always encodes a 0/2/8-byte extended length"),
  }

  if masking {
    let key = prng.expect("client-role frames always carry a PRNG").next_mask();
    out[pos..pos + 4].copy_from_slice(&key);
    pos += 4;
    for (i, b) in data.iter().enumerate() {
      out[pos + i] = b ^ key[i % 4];
    }
  } else {
    out[pos..pos + plen].copy_from_slice(data);
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decoder::WsDecoder;
  use crate::frame::Frame;

  fn decode_all(role: Role, wire: &[u8]) -> Vec<Frame> {
    let mut dec = WsDecoder::new();
    let mut published = Vec::new();
    let n = dec.process(role, wire, &mut published).unwrap();
    assert_eq!(n, wire.len());
    published
  }

  #[test]
  fn control_frame_is_never_fragmented() {
    let chunks =
      build(Role::Server, None, FrameType::WsPing, 0, 32, &[1, 2, 3]).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].as_slice()[0] & 0x80, 0x80); // FIN
  }

  #[test]
  fn empty_control_frame_is_two_bytes_on_server() {
    let chunks = build(Role::Server, None, FrameType::WsPong, 0, 32, &[]).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), 2);
  }

  #[test]
  fn empty_control_frame_is_six_bytes_on_client() {
    let mut prng = Prng::new();
    let chunks =
      build(Role::Client, Some(&mut prng), FrameType::WsClose, 0, 32, &[])
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), 6);
  }

  #[test]
  fn ping_over_125_bytes_is_rejected() {
    let payload = vec![0u8; 200];
    let err = build(Role::Server, None, FrameType::WsPing, 0, 32, &payload)
      .unwrap_err();
    assert!(matches!(err, SessionError::ControlFrameTooLarge));
  }

  #[test]
  fn client_build_fragments_and_round_trips() {
    let mut prng = Prng::new();
    let payload: Vec<u8> = (0..20u8).collect();
    let chunks = build(
      Role::Client,
      Some(&mut prng),
      FrameType::WsBinary,
      0,
      10,
      &payload,
    )
    .unwrap();
    assert!(chunks.len() >= 2);

    let first = chunks.first().unwrap().as_slice();
    assert_eq!(first[0] & 0x0F, OpCode::Binary as u8);
    assert_eq!(first[0] & 0x80, 0); // FIN = 0

    let last = chunks.last().unwrap().as_slice();
    assert_eq!(last[0] & 0x0F, OpCode::Continuation as u8);
    assert_eq!(last[0] & 0x80, 0x80); // FIN = 1

    for c in &chunks {
      assert_eq!(c.as_slice()[1] & 0x80, 0x80); // MASK = 1
    }

    let mut wire = Vec::new();
    for c in &chunks {
      wire.extend_from_slice(c.as_slice());
    }
    let published = decode_all(Role::Server, &wire);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload(), payload);
  }

  #[test]
  fn length_boundaries_use_correct_encoding() {
    for &len in &[125usize, 126, 65535, 65536] {
      let payload = vec![7u8; len];
      let chunks = build(
        Role::Server,
        None,
        FrameType::WsBinary,
        0,
        usize::MAX / 2,
        &payload,
      )
      .unwrap();
      assert_eq!(chunks.len(), 1);
      let wire = chunks[0].as_slice();
      match len {
        125 => assert_eq!(wire[1] & 0x7F, 125),
        126 => assert_eq!(wire[1] & 0x7F, 126),
        65535 => assert_eq!(wire[1] & 0x7F, 126),
        65536 => assert_eq!(wire[1] & 0x7F, 127),
        _ => unreachable!(),
      }
      let published = decode_all(Role::Client, wire);
      assert_eq!(published[0].payload().len(), len);
    }
  }

  #[test]
  fn max_frame_size_just_past_seven_bit_boundary_has_no_trailing_padding() {
    // max_frame_size = 128 leaves only 124 bytes under a 16-bit header,
    // which isn't enough to justify growing past the 7-bit tier: the
    // fragment must fall back to a 7-bit header with a 125-byte payload,
    // not a bigger header whose declared length disagrees with the bytes
    // actually written.
    let payload = vec![9u8; 200];
    let chunks =
      build(Role::Server, None, FrameType::WsBinary, 0, 128, &payload).unwrap();

    let first = chunks.first().unwrap().as_slice();
    assert_eq!(first[1] & 0x7F, 125);
    assert_eq!(first.len(), 127);

    let mut wire = Vec::new();
    for c in &chunks {
      wire.extend_from_slice(c.as_slice());
    }
    let published = decode_all(Role::Client, &wire);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload(), payload);
  }

  #[test]
  fn max_frame_size_just_past_sixteen_bit_boundary_caps_there() {
    // Past the 16-bit ceiling the 64-bit tier only pays off if it can
    // actually carry more than u16::MAX bytes; otherwise stay on the
    // 16-bit tier capped at 65535 rather than growing to a header whose
    // declared length would again disagree with the payload written.
    let payload = vec![3u8; 200_000];
    let chunks =
      build(Role::Server, None, FrameType::WsBinary, 0, 65540, &payload).unwrap();

    let first = chunks.first().unwrap().as_slice();
    assert_eq!(first[1] & 0x7F, 126);
    assert_eq!(u16::from_be_bytes([first[2], first[3]]), u16::MAX);
    assert_eq!(first.len(), 4 + u16::MAX as usize);

    let mut wire = Vec::new();
    for c in &chunks {
      wire.extend_from_slice(c.as_slice());
    }
    let published = decode_all(Role::Client, &wire);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload(), payload);
  }
}
