//! The fixed-capacity byte buffer that is the crate's only payload
//! allocation unit. Payloads reassemble as plain `Vec<Chunk>` lists owned
//! by their `Frame` (or, for `Session::build`'s output, owned outright by
//! the caller) rather than an intrusive linked structure — an empty list
//! is just an empty `Vec`.

use bytes::BytesMut;

/// Capacity of a chunk allocated by the session engine's own payload
/// reassembly path (incoming HTTP body / WS message data). `build()`'s
/// output chunks are sized to their own fragment instead (see
/// `encoder.rs`) and don't use this constant.
pub const CHUNK_CAPACITY: usize = 4096;

/// A single fixed-capacity buffer. Capacity is fixed at construction time;
/// `len()` tracks how much of it has been written so far.
#[derive(Debug, Clone)]
pub struct Chunk {
  buf: BytesMut,
  cap: usize,
}

impl Chunk {
  pub(crate) fn with_capacity(cap: usize) -> Self {
    Self { buf: BytesMut::with_capacity(cap), cap }
  }

  /// Allocates a chunk holding an exact copy of `data` (used by the
  /// encoder, whose fragments are never appended to after construction).
  pub(crate) fn from_exact(data: &[u8]) -> Self {
    let mut c = Self::with_capacity(data.len());
    c.buf.extend_from_slice(data);
    c
  }

  /// Bytes written so far.
  pub fn len(&self) -> usize {
    self.buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  /// Fixed capacity this chunk was allocated with.
  pub fn capacity(&self) -> usize {
    self.cap
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.buf
  }

  pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
    &mut self.buf
  }

  pub(crate) fn remaining(&self) -> usize {
    self.cap - self.buf.len()
  }

  pub(crate) fn extend_from_slice(&mut self, data: &[u8]) {
    debug_assert!(data.len() <= self.remaining());
    self.buf.extend_from_slice(data);
  }
}

/// Appends `data` onto `list`, allocating fresh [`CHUNK_CAPACITY`]-sized
/// chunks as each tail fills up.
pub(crate) fn append_fixed(list: &mut Vec<Chunk>, mut data: &[u8]) {
  while !data.is_empty() {
    if list.last().map_or(true, |c| c.remaining() == 0) {
      list.push(Chunk::with_capacity(CHUNK_CAPACITY));
    }
    let tail = list.last_mut().unwrap();
    let take = data.len().min(tail.remaining());
    tail.extend_from_slice(&data[..take]);
    data = &data[take..];
  }
}

/// Same as [`append_fixed`], but XORs each byte against `key` first, with
/// `offset` being the position of `data[0]` within the overall (possibly
/// multi-call) masked payload. This is how the decoder demasks while
/// copying, one pass, instead of demasking after the fact.
pub(crate) fn append_fixed_masked(
  list: &mut Vec<Chunk>,
  data: &[u8],
  key: [u8; 4],
  offset: usize,
) {
  let mut unmasked = data.to_vec();
  crate::mask::apply_mask(&mut unmasked, key, offset);
  append_fixed(list, &unmasked);
}

/// Concatenates every chunk in `list` into one owned buffer.
pub fn concat(list: &[Chunk]) -> Vec<u8> {
  let total: usize = list.iter().map(Chunk::len).sum();
  let mut out = Vec::with_capacity(total);
  for c in list {
    out.extend_from_slice(c.as_slice());
  }
  out
}
