//! claudio-pty: terminal session service for the Claudio command center.
//!
//! Owns every pseudo-terminal the UI talks to. The UI never touches a PTY
//! directly; it issues commands against the [`SessionRegistry`] and receives
//! output and exit notifications through the [`Broadcaster`].
//!
//! # Architecture
//!
//! - [`PtyHandle`]: One OS pseudo-terminal and its child process (spawn, write,
//!   resize, kill). Output is read on a dedicated thread and surfaced through
//!   [`PtyOutput::read_chunk`].
//! - [`TerminalSession`]: Pairs a `PtyHandle` with the session metadata the UI
//!   lists (title, creation time, size, lifecycle state).
//! - [`SessionRegistry`]: The single map of live sessions plus the active
//!   session pointer. All mutations are serialized here.
//! - Output pump: One tokio task per session that drains the PTY and hands
//!   chunks to the broadcaster until the session ends.
//! - [`Broadcaster`]: Fans `terminal:output` and `terminal:exit` events out to
//!   sinks and subscriptions.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
mod pump;
pub mod pty;
pub mod registry;
pub mod session;

pub use broadcast::{Broadcaster, EventSink, Subscription};
pub use config::{LaunchSpec, TerminalConfig};
pub use error::TerminalError;
pub use events::{TerminalEvent, TerminalExit, TerminalOutput, EXIT_EVENT, OUTPUT_EVENT};
pub use pty::{PtyError, PtyHandle, PtyOutput};
pub use registry::SessionRegistry;
pub use session::{
    Dimensions, ExitReason, Session, SessionId, SessionState, SessionSummary, TerminalSession,
};
