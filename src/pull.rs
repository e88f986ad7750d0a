//! A second, simpler handle that exposes only the HTTP/1 side: parsed
//! headers, a bounded content list, and a `consume_data` operation for
//! streaming a large body without holding all of it in memory at once.

use crate::chunk::Chunk;
use crate::error::SessionError;
use crate::header::Header;
use crate::Role;

/// Chunk capacity for [`PullParser`]'s content list — larger than the
/// session engine's [`crate::chunk::CHUNK_CAPACITY`] since this handle is
/// meant for streaming whole bodies rather than interleaving with frame
/// decode state.
pub const PULL_CHUNK_CAPACITY: usize = 8192;

/// `(major, minor, patch)` of the embedded HTTP/1 parser, reported by
/// [`PullParser::version`].
pub const PARSER_VERSION: (u16, u16, u16) = (1, 8, 0);

enum Stage {
  Head,
  Body { mode: BodyMode },
  Done,
}

enum BodyMode {
  None,
  ContentLength(u64),
  Chunked(ChunkedState),
}

enum ChunkStage {
  Size,
  Data,
  DataCrlf,
  Trailer,
  Done,
}

struct ChunkedState {
  stage: ChunkStage,
  line: Vec<u8>,
  remaining: u64,
}

impl ChunkedState {
  fn new() -> Self {
    Self { stage: ChunkStage::Size, line: Vec::new(), remaining: 0 }
  }
}

fn take_line(line: &mut Vec<u8>, buf: &[u8]) -> Option<usize> {
  for (i, &b) in buf.iter().enumerate() {
    if b == b'\n' {
      if line.last() == Some(&b'\r') {
        line.pop();
      }
      return Some(i + 1);
    }
    line.push(b);
  }
  None
}

/// The HTTP-only pull handle: `create`, feed bytes via `process`, read
/// `method`/`path`/`status`/`headers`/`content`, drain consumed chunks via
/// `consume_data`, and `reset` to parse another message on the same
/// allocation.
pub struct PullParser {
  role: Role,
  accum: Vec<u8>,
  stage: Stage,

  pub method: Option<Vec<u8>>,
  pub path: Option<Vec<u8>>,
  pub status: u16,
  pub headers: Vec<Header>,
  pub content: Vec<Chunk>,
  pub message_complete: bool,
  pub error_msg: Option<String>,
}

impl PullParser {
  pub fn create(role: Role) -> Self {
    Self {
      role,
      accum: Vec::new(),
      stage: Stage::Head,
      method: None,
      path: None,
      status: 0,
      headers: Vec::new(),
      content: Vec::new(),
      message_complete: false,
      error_msg: None,
    }
  }

  /// Re-initializes parser state so the handle can parse another message,
  /// keeping the allocated `content`/`headers` vectors around for reuse.
  pub fn reset(&mut self) {
    self.accum.clear();
    self.stage = Stage::Head;
    self.method = None;
    self.path = None;
    self.status = 0;
    self.headers.clear();
    self.content.clear();
    self.message_complete = false;
    self.error_msg = None;
  }

  /// Drops the first `count` chunks from `content`, for callers streaming
  /// a large body in bounded memory.
  pub fn consume_data(&mut self, count: usize) {
    let drop_n = count.min(self.content.len());
    self.content.drain(0..drop_n);
  }

  /// The embedded HTTP/1 parser's semver triple.
  pub fn version(&self) -> (u16, u16, u16) {
    PARSER_VERSION
  }

  pub fn process(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
    match self.process_inner(buf) {
      Ok(n) => Ok(n),
      Err(err) => {
        self.error_msg = Some(err.to_string());
        Err(err)
      }
    }
  }

  fn process_inner(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
    let mut nread = 0usize;

    if matches!(self.stage, Stage::Head) {
      let old_len = self.accum.len();
      self.accum.extend_from_slice(buf);

      let mut storage = [httparse::EMPTY_HEADER; 64];
      let (hlen, method, path, status, headers) = match self.role {
        Role::Server => {
          let mut req = httparse::Request::new(&mut storage);
          match req
            .parse(&self.accum)
            .map_err(|e| SessionError::HttpParse(e.to_string()))?
          {
            httparse::Status::Partial => return Ok(buf.len()),
            httparse::Status::Complete(hlen) => (
              hlen,
              req.method.map(|m| m.as_bytes().to_vec()),
              req.path.map(|p| p.as_bytes().to_vec()),
              None,
              copy_headers(req.headers),
            ),
          }
        }
        Role::Client => {
          let mut resp = httparse::Response::new(&mut storage);
          match resp
            .parse(&self.accum)
            .map_err(|e| SessionError::HttpParse(e.to_string()))?
          {
            httparse::Status::Partial => return Ok(buf.len()),
            httparse::Status::Complete(hlen) => {
              (hlen, None, None, resp.code, copy_headers(resp.headers))
            }
          }
        }
      };

      nread = hlen - old_len;
      self.accum.truncate(hlen);

      self.method = method;
      self.path = path;
      if let Some(status) = status {
        self.status = status;
      }
      let mode = body_mode(&headers);
      self.headers = headers;
      self.stage = Stage::Body { mode };
    }

    if let Stage::Body { mode } = &mut self.stage {
      let (used, done) = feed_body(mode, &mut self.content, &buf[nread..])?;
      nread += used;
      if done {
        self.message_complete = true;
        self.stage = Stage::Done;
      }
    }

    Ok(nread)
  }
}

fn copy_headers(raw: &[httparse::Header]) -> Vec<Header> {
  raw
    .iter()
    .take_while(|h| !h.name.is_empty())
    .map(|h| Header::new(h.name.as_bytes(), h.value))
    .collect()
}

fn body_mode(headers: &[Header]) -> BodyMode {
  if headers
    .iter()
    .any(|h| h.key_is("transfer-encoding") && h.value_contains_ignore_case("chunked"))
  {
    return BodyMode::Chunked(ChunkedState::new());
  }
  for h in headers {
    if h.key_is("content-length") {
      if let Ok(text) = std::str::from_utf8(&h.value) {
        if let Ok(len) = text.trim().parse::<u64>() {
          return BodyMode::ContentLength(len);
        }
      }
    }
  }
  BodyMode::None
}

fn append_to_content(content: &mut Vec<Chunk>, mut data: &[u8]) {
  while !data.is_empty() {
    if content.last().map_or(true, |c| c.remaining() == 0) {
      content.push(Chunk::with_capacity(PULL_CHUNK_CAPACITY));
    }
    let tail = content.last_mut().unwrap();
    let take = data.len().min(tail.remaining());
    tail.extend_from_slice(&data[..take]);
    data = &data[take..];
  }
}

fn feed_body(
  mode: &mut BodyMode,
  content: &mut Vec<Chunk>,
  buf: &[u8],
) -> Result<(usize, bool), SessionError> {
  match mode {
    BodyMode::None => Ok((0, true)),
    BodyMode::ContentLength(remaining) => {
      let take = buf.len().min(*remaining as usize);
      if take > 0 {
        append_to_content(content, &buf[..take]);
        *remaining -= take as u64;
      }
      Ok((take, *remaining == 0))
    }
    BodyMode::Chunked(state) => feed_chunked(state, content, buf),
  }
}

fn feed_chunked(
  state: &mut ChunkedState,
  content: &mut Vec<Chunk>,
  buf: &[u8],
) -> Result<(usize, bool), SessionError> {
  let mut nread = 0usize;
  loop {
    match state.stage {
      ChunkStage::Size => match take_line(&mut state.line, &buf[nread..]) {
        Some(used) => {
          nread += used;
          let text = std::str::from_utf8(&state.line)
            .map_err(|_| SessionError::HttpParse("invalid chunk size".into()))?;
          let size_field = text.split(';').next().unwrap_or("").trim();
          let size = u64::from_str_radix(size_field, 16)
            .map_err(|_| SessionError::HttpParse("invalid chunk size".into()))?;
          state.line.clear();
          if size == 0 {
            state.stage = ChunkStage::Trailer;
          } else {
            state.remaining = size;
            state.stage = ChunkStage::Data;
          }
        }
        None => return Ok((buf.len(), false)),
      },
      ChunkStage::Data => {
        let avail = &buf[nread..];
        let take = avail.len().min(state.remaining as usize);
        if take > 0 {
          append_to_content(content, &avail[..take]);
          nread += take;
          state.remaining -= take as u64;
        }
        if state.remaining == 0 {
          state.stage = ChunkStage::DataCrlf;
        } else {
          return Ok((nread, false));
        }
      }
      ChunkStage::DataCrlf => match take_line(&mut state.line, &buf[nread..]) {
        Some(used) => {
          nread += used;
          state.line.clear();
          state.stage = ChunkStage::Size;
        }
        None => return Ok((buf.len(), false)),
      },
      ChunkStage::Trailer => match take_line(&mut state.line, &buf[nread..]) {
        Some(used) => {
          nread += used;
          let is_blank = state.line.is_empty();
          state.line.clear();
          if is_blank {
            state.stage = ChunkStage::Done;
            return Ok((nread, true));
          }
          // Trailer headers are read (to keep finding the terminating
          // blank line) but not merged into the parser's header list.
        }
        None => return Ok((buf.len(), false)),
      },
      ChunkStage::Done => return Ok((nread, true)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_headers_and_content_length_body() {
    let mut parser = PullParser::create(Role::Server);
    let input =
      b"POST /upload HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello";
    let n = parser.process(input).unwrap();
    assert_eq!(n, input.len());
    assert!(parser.message_complete);
    assert_eq!(parser.method.as_deref(), Some(&b"POST"[..]));
    assert_eq!(parser.content.len(), 1);
    assert_eq!(parser.content[0].as_slice(), b"hello");
  }

  #[test]
  fn consume_data_drops_leading_chunks() {
    let mut parser = PullParser::create(Role::Server);
    let body = vec![b'x'; PULL_CHUNK_CAPACITY * 2 + 10];
    let head = format!(
      "POST /upload HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
      body.len()
    );
    let mut input = head.into_bytes();
    input.extend_from_slice(&body);

    parser.process(&input).unwrap();
    assert_eq!(parser.content.len(), 3);
    parser.consume_data(2);
    assert_eq!(parser.content.len(), 1);
  }

  #[test]
  fn chunked_body_consumes_trailing_blank_line() {
    let mut parser = PullParser::create(Role::Server);
    let input = concat!(
      "POST /upload HTTP/1.1\r\n",
      "Transfer-Encoding: chunked\r\n",
      "\r\n",
      "4\r\n",
      "Wiki\r\n",
      "5\r\n",
      "pedia\r\n",
      "0\r\n",
      "\r\n"
    );

    let n = parser.process(input.as_bytes()).unwrap();
    assert_eq!(n, input.len());
    assert!(parser.message_complete);
    let body: Vec<u8> = parser.content.iter().flat_map(|c| c.as_slice().to_vec()).collect();
    assert_eq!(body, b"Wikipedia");
  }

  #[test]
  fn reset_allows_reuse() {
    let mut parser = PullParser::create(Role::Server);
    parser.process(b"GET /a HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(parser.path.as_deref(), Some(&b"/a"[..]));

    parser.reset();
    assert!(parser.path.is_none());
    assert!(parser.content.is_empty());

    parser.process(b"GET /b HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(parser.path.as_deref(), Some(&b"/b"[..]));
  }
}
