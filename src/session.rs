//! The top-level session handle: owns the HTTP adapter and, once a
//! WebSocket upgrade is accepted, the frame decoder, presenting both
//! behind one pull-style `process`/`build` API.

use sha1::{Digest, Sha1};

use crate::chunk::Chunk;
use crate::decoder::WsDecoder;
use crate::encoder;
use crate::error::SessionError;
use crate::frame::{Frame, FrameType};
use crate::header::Header;
use crate::http::Http1Adapter;
use crate::prng::Prng;

/// Which side of the connection this session represents.
///
/// Determines HTTP start-line direction (`Server` parses a request,
/// `Client` a response) and WebSocket mask parity (`Client` emits masked
/// frames and must receive only unmasked ones; `Server` is the mirror).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Server,
  Client,
}

/// Coarse progress marker, surfaced on [`Session::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Init,
  Begin,
  Header,
  Body,
  Finish,
  Error,
}

enum Regime {
  Http(Http1Adapter),
  Ws(WsDecoder),
}

/// The root handle. Created with [`Session::create`], fed with
/// [`Session::process`], and released with [`Session::reclaim`] or
/// [`Session::close`].
pub struct Session {
  pub role: Role,
  pub state: SessionState,
  pub method: Option<Vec<u8>>,
  pub path: Option<Vec<u8>>,
  pub status: u16,
  pub upgrade: bool,
  pub headers: Vec<Header>,
  pub frames: Vec<Frame>,
  pub error_msg: Option<String>,

  regime: Regime,
  prng: Option<Prng>,
}

impl Session {
  /// Allocates a session for `role`. Client sessions seed a PRNG up front
  /// since every outgoing frame they build needs a fresh masking key;
  /// server sessions never mask, so they carry none.
  pub fn create(role: Role) -> Self {
    Self {
      role,
      state: SessionState::Init,
      method: None,
      path: None,
      status: 0,
      upgrade: false,
      headers: Vec::new(),
      frames: Vec::new(),
      error_msg: None,
      regime: Regime::Http(Http1Adapter::new(role)),
      prng: match role {
        Role::Client => Some(Prng::new()),
        Role::Server => None,
      },
    }
  }

  /// Feeds `buf` into whichever regime the session currently occupies.
  /// When this call's HTTP headers complete with a valid upgrade, the
  /// session flips to WebSocket and keeps consuming any remaining bytes of
  /// `buf` as frame data in the same call. Returns the number of bytes
  /// consumed, which may be less than `buf.len()` when more input is
  /// needed to complete the frame or message currently in progress.
  pub fn process(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
    if buf.is_empty() {
      return Err(SessionError::InvalidParams);
    }
    if self.state == SessionState::Init {
      self.state = SessionState::Begin;
    }

    match self.process_inner(buf) {
      Ok(n) => Ok(n),
      Err(err) => {
        self.state = SessionState::Error;
        self.error_msg = Some(err.to_string());
        Err(err)
      }
    }
  }

  fn process_inner(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
    if let Regime::Ws(decoder) = &mut self.regime {
      return decoder.process(self.role, buf, &mut self.frames);
    }
    let Regime::Http(adapter) = &mut self.regime else { unreachable!() };

    let result = adapter.process(buf, &mut self.frames)?;
    let mut nread = result.consumed;

    if let Some(info) = result.headers {
      self.method = info.method;
      self.path = info.path;
      if let Some(status) = info.status {
        self.status = status;
      }
      self.headers = info.headers;
      self.state = SessionState::Header;

      if info.upgrade_to_ws {
        self.upgrade = true;
        self.state = SessionState::Body;
        self.regime = Regime::Ws(WsDecoder::new());

        if nread < buf.len() {
          let Regime::Ws(decoder) = &mut self.regime else { unreachable!() };
          nread += decoder.process(self.role, &buf[nread..], &mut self.frames)?;
        }
      }
    }

    if result.message_complete {
      self.state = SessionState::Finish;
    }

    Ok(nread)
  }

  /// Encodes `payload` as one or more on-wire WebSocket frames of
  /// `frame_type`, fragmenting across `max_frame_size` and masking
  /// per [`Session::role`]. See `encoder::build` for the full rule set.
  pub fn build(
    &mut self,
    frame_type: FrameType,
    rsv_bits: u8,
    max_frame_size: usize,
    payload: &[u8],
  ) -> Result<Vec<Chunk>, SessionError> {
    encoder::build(
      self.role,
      self.prng.as_mut(),
      frame_type,
      rsv_bits,
      max_frame_size,
      payload,
    )
  }

  /// Clears published frames, the error message, and (outside WS regime)
  /// the HTTP method/path/status/headers. A session that has upgraded
  /// keeps its handshake metadata visible, matching the reference
  /// behavior of preserving the connection's identifying information for
  /// the lifetime of the WebSocket regime.
  pub fn reclaim(&mut self) {
    self.frames.clear();
    self.error_msg = None;
    if !matches!(self.regime, Regime::Ws(_)) {
      self.method = None;
      self.path = None;
      self.status = 0;
      self.headers.clear();
    }
  }

  /// Releases the session. Equivalent to `reclaim` followed by dropping
  /// the handle — there is nothing else to release since every resource
  /// here is ordinary owned Rust state.
  pub fn close(mut self) {
    self.reclaim();
  }
}

/// Computes the SHA-1 digest of `data`. Exposed as a convenience for
/// computing the `Sec-WebSocket-Accept` handshake value
/// (`sha1(key ++ "258EAFA5-E914-47DA-95CA-C5AB0DC85B11")`); pairing the
/// key with the client's nonce and base64-encoding the result is left to
/// the caller.
pub fn sha1(data: &[u8]) -> [u8; 20] {
  let mut hasher = Sha1::new();
  hasher.update(data);
  hasher.finalize().into()
}
