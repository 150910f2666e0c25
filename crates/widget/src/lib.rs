//! Switchboard Widget
//!
//! The customer-side synchronization agent. Persists only session
//! identifiers (conversation id, handoff id, handoff status) across
//! reloads; the transcript itself is always reconstructed from the server.
//! While a handoff is live, two independent timers drive a status poll and
//! a duplicate-suppressing message poll — the widget never receives push
//! events.

pub mod agent;
pub mod seen;
pub mod session;
pub mod transport;

pub use agent::{Renderer, SyncAgent, WidgetConfig};
pub use seen::SeenMessages;
pub use session::{FileStore, MemoryStore, SessionRecord, SessionStore};
pub use transport::{HttpTransport, Transport, TransportError};
