//! Buffer-until-complete HTTP/1 parsing and the upgrade gate that decides
//! whether a session's regime should flip from HTTP to WebSocket.

use crate::chunk;
use crate::error::SessionError;
use crate::frame::{Frame, FrameType};
use crate::header::Header;
use crate::Role;

const MAX_HEADERS: usize = 64;

/// What `Http1Adapter::process` learned once the start-line and headers
/// were fully parsed.
#[derive(Debug)]
pub(crate) struct HeadersInfo {
  pub method: Option<Vec<u8>>,
  pub path: Option<Vec<u8>>,
  pub status: Option<u16>,
  pub headers: Vec<Header>,
  pub upgrade_to_ws: bool,
}

struct ParsedHead {
  hlen: usize,
  method: Option<Vec<u8>>,
  path: Option<Vec<u8>>,
  status_code: Option<u16>,
  headers: Vec<Header>,
}

fn copy_headers(raw: &[httparse::Header]) -> Vec<Header> {
  raw
    .iter()
    .take_while(|h| !h.name.is_empty())
    .map(|h| Header::new(h.name.as_bytes(), h.value))
    .collect()
}

fn parse_request<'a>(
  storage: &mut [httparse::Header<'a>],
  accum: &'a [u8],
) -> Result<Option<ParsedHead>, SessionError> {
  let mut req = httparse::Request::new(storage);
  match req.parse(accum).map_err(|e| SessionError::HttpParse(e.to_string()))? {
    httparse::Status::Partial => Ok(None),
    httparse::Status::Complete(hlen) => Ok(Some(ParsedHead {
      hlen,
      method: req.method.map(|m| m.as_bytes().to_vec()),
      path: req.path.map(|p| p.as_bytes().to_vec()),
      status_code: None,
      headers: copy_headers(req.headers),
    })),
  }
}

fn parse_response<'a>(
  storage: &mut [httparse::Header<'a>],
  accum: &'a [u8],
) -> Result<Option<ParsedHead>, SessionError> {
  let mut resp = httparse::Response::new(storage);
  match resp.parse(accum).map_err(|e| SessionError::HttpParse(e.to_string()))? {
    httparse::Status::Partial => Ok(None),
    httparse::Status::Complete(hlen) => Ok(Some(ParsedHead {
      hlen,
      method: None,
      path: None,
      status_code: resp.code,
      headers: copy_headers(resp.headers),
    })),
  }
}

/// Chunk-size/data/trailer state machine for `Transfer-Encoding: chunked`
/// bodies. `httparse` only parses the start-line and headers; it leaves
/// body framing, including dechunking, to the caller.
struct ChunkedBodyState {
  stage: ChunkStage,
  line: Vec<u8>,
  remaining: u64,
}

enum ChunkStage {
  Size,
  Data,
  DataCrlf,
  Trailer,
  Done,
}

/// Accumulates bytes into `line` until a CRLF terminator appears, stripping
/// it, and reports how many bytes of `buf` were consumed doing so. Returns
/// `None` (having consumed all of `buf` into `line`) if no terminator was
/// found yet.
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

impl ChunkedBodyState {
  fn new() -> Self {
    Self { stage: ChunkStage::Size, line: Vec::new(), remaining: 0 }
  }

  /// Returns `(bytes consumed, body complete)`.
  fn feed(
    &mut self,
    buf: &[u8],
    frame: &mut Frame,
  ) -> Result<(usize, bool), SessionError> {
    let mut nread = 0usize;
    loop {
      match self.stage {
        ChunkStage::Size => match take_line(&mut self.line, &buf[nread..]) {
          Some(used) => {
            nread += used;
            let text = std::str::from_utf8(&self.line)
              .map_err(|_| SessionError::HttpParse("invalid chunk size".into()))?;
            let size_field = text.split(';').next().unwrap_or("").trim();
            let size = u64::from_str_radix(size_field, 16)
              .map_err(|_| SessionError::HttpParse("invalid chunk size".into()))?;
            self.line.clear();
            if size == 0 {
              self.stage = ChunkStage::Trailer;
            } else {
              self.remaining = size;
              self.stage = ChunkStage::Data;
            }
          }
          None => {
            nread = buf.len();
            break;
          }
        },
        ChunkStage::Data => {
          let avail = &buf[nread..];
          let take = avail.len().min(self.remaining as usize);
          if take > 0 {
            chunk::append_fixed(frame.chunks_mut(), &avail[..take]);
            nread += take;
            self.remaining -= take as u64;
          }
          if self.remaining == 0 {
            self.stage = ChunkStage::DataCrlf;
          } else {
            break;
          }
        }
        ChunkStage::DataCrlf => match take_line(&mut self.line, &buf[nread..]) {
          Some(used) => {
            nread += used;
            self.line.clear();
            self.stage = ChunkStage::Size;
          }
          None => {
            nread = buf.len();
            break;
          }
        },
        ChunkStage::Trailer => match take_line(&mut self.line, &buf[nread..]) {
          Some(used) => {
            nread += used;
            let is_blank = self.line.is_empty();
            self.line.clear();
            if is_blank {
              self.stage = ChunkStage::Done;
              return Ok((nread, true));
            }
            // Trailer headers are read (to keep finding the terminating
            // blank line) but not merged into the session's header list.
          }
          None => {
            nread = buf.len();
            break;
          }
        },
        ChunkStage::Done => return Ok((nread, true)),
      }
    }
    Ok((nread, false))
  }
}

enum BodyMode {
  None,
  ContentLength(u64),
  Chunked(ChunkedBodyState),
}

fn body_mode_from_headers(headers: &[Header]) -> BodyMode {
  let chunked = headers
    .iter()
    .any(|h| h.key_is("transfer-encoding") && h.value_contains_ignore_case("chunked"));
  if chunked {
    return BodyMode::Chunked(ChunkedBodyState::new());
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

fn feed_body(
  mode: &mut BodyMode,
  frame: &mut Frame,
  buf: &[u8],
) -> Result<(usize, bool), SessionError> {
  match mode {
    BodyMode::None => Ok((0, true)),
    BodyMode::ContentLength(remaining) => {
      let take = buf.len().min(*remaining as usize);
      if take > 0 {
        chunk::append_fixed(frame.chunks_mut(), &buf[..take]);
        *remaining -= take as u64;
      }
      Ok((take, *remaining == 0))
    }
    BodyMode::Chunked(state) => state.feed(buf, frame),
  }
}

enum Stage {
  Head,
  Body { mode: BodyMode, frame: Frame },
  Done,
}

/// Parses one HTTP/1 request (server role) or response (client role) from
/// an arbitrarily-split byte stream, then (if the message isn't a
/// WebSocket upgrade) reads its body. Does not support pipelining more
/// than one message per adapter — a session that stays in HTTP regime
/// after a complete non-upgrade message simply stops consuming bytes.
pub(crate) struct Http1Adapter {
  role: Role,
  accum: Vec<u8>,
  stage: Stage,
}

impl Http1Adapter {
  pub fn new(role: Role) -> Self {
    Self { role, accum: Vec::new(), stage: Stage::Head }
  }

  fn evaluate_upgrade(&self, head: &ParsedHead) -> Result<bool, SessionError> {
    let has_upgrade_header = head
      .headers
      .iter()
      .any(|h| h.key_is("upgrade") && h.value_contains_ignore_case("websocket"));
    let has_connection_upgrade = head
      .headers
      .iter()
      .any(|h| h.key_is("connection") && h.value_contains_ignore_case("upgrade"));

    if !has_upgrade_header || !has_connection_upgrade {
      return Ok(false);
    }

    match self.role {
      Role::Server => {
        // Case-insensitive on both the header name (key_is already does
        // that) and its value, since "13" is the only version this engine
        // speaks regardless of how a client capitalizes the header.
        let version_ok = head
          .headers
          .iter()
          .any(|h| h.key_is("sec-websocket-version") && h.value_starts_with("13"));
        if !version_ok {
          return Err(SessionError::InvalidWebSocketVersion);
        }
        Ok(true)
      }
      Role::Client => Ok(head.status_code == Some(101)),
    }
  }

  /// Feeds `buf` into the parser. Returns the number of bytes consumed,
  /// the parsed start-line/headers on the call where they complete, and
  /// whether the whole message (headers + body) is now complete. A
  /// completed non-upgrade message's body, once fully read, is pushed onto
  /// `published` as a `FrameType::HttpBody` frame.
  pub fn process(
    &mut self,
    buf: &[u8],
    published: &mut Vec<Frame>,
  ) -> Result<Http1Result, SessionError> {
    let mut nread = 0usize;
    let mut headers_info = None;

    if matches!(self.stage, Stage::Head) {
      let old_len = self.accum.len();
      self.accum.extend_from_slice(buf);

      let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
      let parsed = match self.role {
        Role::Server => parse_request(&mut storage, &self.accum)?,
        Role::Client => parse_response(&mut storage, &self.accum)?,
      };

      let Some(head) = parsed else {
        return Ok(Http1Result {
          consumed: buf.len(),
          headers: None,
          message_complete: false,
        });
      };

      nread = head.hlen - old_len;
      self.accum.truncate(head.hlen);

      let upgrade_to_ws = self.evaluate_upgrade(&head)?;
      let info = HeadersInfo {
        method: head.method,
        path: head.path,
        status: head.status_code,
        headers: head.headers,
        upgrade_to_ws,
      };

      if upgrade_to_ws {
        self.stage = Stage::Done;
        return Ok(Http1Result {
          consumed: nread,
          headers: Some(info),
          message_complete: false,
        });
      }

      self.stage = Stage::Body {
        mode: body_mode_from_headers(&info.headers),
        frame: Frame::new(FrameType::HttpBody),
      };
      headers_info = Some(info);
    }

    let mut message_complete = false;
    if let Stage::Body { mode, frame } = &mut self.stage {
      let (used, done) = feed_body(mode, frame, &buf[nread..])?;
      nread += used;
      if done {
        message_complete = true;
        if let Stage::Body { frame, .. } = std::mem::replace(&mut self.stage, Stage::Done) {
          published.push(frame);
        }
      }
    }

    Ok(Http1Result { consumed: nread, headers: headers_info, message_complete })
  }
}

/// Outcome of one `Http1Adapter::process` call.
#[derive(Debug)]
pub(crate) struct Http1Result {
  pub consumed: usize,
  pub headers: Option<HeadersInfo>,
  pub message_complete: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn get_request_with_no_body() {
    let mut adapter = Http1Adapter::new(Role::Server);
    let mut published = Vec::new();
    let input = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";

    let result = adapter.process(input, &mut published).unwrap();
    assert_eq!(result.consumed, input.len());
    assert!(result.message_complete);
    let info = result.headers.unwrap();
    assert_eq!(info.method.unwrap(), b"GET");
    assert_eq!(info.path.unwrap(), b"/index.html");
    assert!(!info.upgrade_to_ws);
    assert_eq!(published.len(), 1);
    assert!(published[0].is_empty());
  }

  #[test]
  fn valid_upgrade_request_flips_regime() {
    let mut adapter = Http1Adapter::new(Role::Server);
    let mut published = Vec::new();
    let input = concat!(
      "GET /chat HTTP/1.1\r\n",
      "Host: example.com\r\n",
      "Upgrade: websocket\r\n",
      "Connection: Upgrade\r\n",
      "Sec-WebSocket-Version: 13\r\n",
      "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
      "\r\n"
    );

    let result = adapter.process(input.as_bytes(), &mut published).unwrap();
    assert_eq!(result.consumed, input.len());
    assert!(!result.message_complete);
    assert!(result.headers.unwrap().upgrade_to_ws);
    assert!(published.is_empty());
  }

  #[test]
  fn upgrade_request_with_wrong_version_is_rejected() {
    let mut adapter = Http1Adapter::new(Role::Server);
    let mut published = Vec::new();
    let input = concat!(
      "GET /chat HTTP/1.1\r\n",
      "Host: example.com\r\n",
      "Upgrade: websocket\r\n",
      "Connection: Upgrade\r\n",
      "Sec-WebSocket-Version: 8\r\n",
      "\r\n"
    );

    let err = adapter.process(input.as_bytes(), &mut published).unwrap_err();
    assert!(matches!(err, SessionError::InvalidWebSocketVersion));
  }

  #[test]
  fn content_length_body_split_across_calls() {
    let mut adapter = Http1Adapter::new(Role::Server);
    let mut published = Vec::new();
    let head = b"POST /submit HTTP/1.1\r\nContent-Length: 10\r\n\r\n";
    let r1 = adapter.process(head, &mut published).unwrap();
    assert_eq!(r1.consumed, head.len());
    assert!(r1.headers.is_some());
    assert!(!r1.message_complete);
    assert!(published.is_empty());

    let r2 = adapter.process(b"helloworl", &mut published).unwrap();
    assert_eq!(r2.consumed, 9);
    assert!(!r2.message_complete);
    assert!(published.is_empty());

    let r3 = adapter.process(b"d", &mut published).unwrap();
    assert_eq!(r3.consumed, 1);
    assert!(r3.message_complete);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload(), b"helloworld");
  }

  #[test]
  fn chunked_body_with_trailer() {
    let mut adapter = Http1Adapter::new(Role::Server);
    let mut published = Vec::new();
    let input = concat!(
      "POST /submit HTTP/1.1\r\n",
      "Transfer-Encoding: chunked\r\n",
      "\r\n",
      "4\r\n",
      "Wiki\r\n",
      "5\r\n",
      "pedia\r\n",
      "0\r\n",
      "\r\n"
    );

    let result = adapter.process(input.as_bytes(), &mut published).unwrap();
    assert_eq!(result.consumed, input.len());
    assert!(result.message_complete);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload(), b"Wikipedia");
  }
}
