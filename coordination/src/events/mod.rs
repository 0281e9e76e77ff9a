//! Envelope bus for in-process coordination
//!
//! # Architecture
//!
//! 1. **Envelopes** (`envelope.rs`): the message model, the sequence-owning
//!    [`EnvelopeFactory`] and hierarchical [`topic_match`].
//!
//! 2. **Bus** (`bus.rs`): bounded, drop-on-full fan-out to every
//!    subscription whose pattern matches the published topic.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │   Producer   │────▶│  ChannelBus  │────▶│ "consensus"   (64) │
//! │  (publish)   │     │ (topic_match)│────▶│ "consensus.s1"(64) │
//! └──────────────┘     └──────────────┘     └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use coordination::events::{Bus, ChannelBus, Message};
//!
//! let bus = ChannelBus::new().shared();
//! let mut rx = bus.subscribe("parallel.wave-0")?;
//! bus.publish("parallel.wave-0.board", Message::text("board.discovery", "task-1", "uses REST"))?;
//! let envelope = rx.recv().await;
//! ```

pub mod bus;
pub mod envelope;

pub use bus::{
    Bus, ChannelBus, EnvelopeReceiver, EventBusError, EventBusResult, SharedBus,
    SUBSCRIPTION_CAPACITY,
};
pub use envelope::{
    topic_match, Envelope, EnvelopeFactory, Message, SharedEnvelopeFactory, BOARD_CONTEXT,
    BOARD_DISCOVERY, BOARD_INTENT, BOARD_WARNING,
};
