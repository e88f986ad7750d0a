// Copyright 2023 Divy Srivastava <dj.srivastava23@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A pull-style (sans-I/O) HTTP/1 and WebSocket session engine.
//!
//! The caller owns the socket, the event loop, and TLS. This crate only
//! turns byte slices fed to [`Session::process`] into parsed HTTP state and
//! complete WebSocket frames, and turns outgoing application payloads
//! handed to [`Session::build`] into ready-to-write frame bytes. A session
//! starts out parsing HTTP; if a client's request carries a valid RFC 6455
//! upgrade, the session flips to decoding WebSocket frames mid-stream.
//!
//! ```
//! use pullws::{Session, Role};
//!
//! let mut session = Session::create(Role::Server);
//! let consumed = session.process(b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
//! assert_eq!(session.path.as_deref(), Some(&b"/x"[..]));
//! assert_eq!(consumed, 29);
//! ```
//!
//! [`pull::PullParser`] exposes the HTTP half of this engine on its own,
//! for callers that never need the WebSocket side.

mod chunk;
mod decoder;
mod encoder;
mod error;
mod frame;
mod header;
mod http;
mod mask;
mod prng;
pub mod pull;
mod session;

pub use chunk::{Chunk, CHUNK_CAPACITY};
pub use error::SessionError;
pub use frame::{Frame, FrameType, OpCode};
pub use header::Header;
pub use session::{sha1, Role, Session, SessionState};
