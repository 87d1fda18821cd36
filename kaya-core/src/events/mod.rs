//! Event-driven coordination for the Kaya orchestrator.
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the 13 event kinds emitted across
//!    routing, worker execution, validation, HITL, budget, and resilience.
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast pub/sub fanning out to
//!    sinks (`sinks.rs`): console, NDJSON file, optional WebSocket.
//! 3. **Event History** (`history.rs`): queries and replay over the NDJSON
//!    log left behind by the file sink.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Producer   │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                 ┌───────────┼────────────┐
//!                 ▼           ▼            ▼
//!            console      NDJSON file   WebSocket
//! ```

pub mod bus;
pub mod history;
pub mod sinks;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus, SinkConfig,
};
pub use history::{EventHistory, EventStats, HistoryError, HistoryResult, ReplayBuilder, ReplayStats};
pub use types::{AgentOutcome, EventEnvelope, EventId, KayaEvent};
