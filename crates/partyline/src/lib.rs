//! # Partyline
//!
//! A minimal host/client message bus for devices on the same local
//! network. One device hosts; others join it by address. The host fans
//! out its own messages to every client and relays each client's
//! messages to all the others, so the application sees a simple shared
//! channel of `(op_code, payload)` records.
//!
//! The application talks to a single type, [`Session`]:
//!
//! ```rust,no_run
//! use partyline::{Session, SessionConfig, SessionEvent};
//!
//! # async fn run() -> Result<(), partyline::SessionError> {
//! let mut session = Session::new(SessionConfig::default());
//! session.host(partyline::DEFAULT_PORT).await?;
//! session.send("score", "42").await?;
//!
//! while let Some(event) = session.next_event().await {
//!     match event {
//!         SessionEvent::Data(msg) => println!("{}: {}", msg.op_code, msg.payload),
//!         SessionEvent::ServerShutdown => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! All socket I/O runs on background tasks; every notification is
//! queued as a [`SessionEvent`] and drained by the application
//! ([`Session::poll_event`] once per tick, or [`Session::next_event`]).

mod config;
mod error;
mod event;
mod session;

pub use config::{DEFAULT_PORT, SessionConfig};
pub use error::SessionError;
pub use event::SessionEvent;
pub use session::{Role, Session};

// Re-exported so applications only need this crate.
pub use partyline_protocol::{CLIENT_EXIT, Codec, JsonCodec, Message, ProtocolError, SRV_SHUTDOWN};
pub use partyline_transport::{PeerId, TransportError};
