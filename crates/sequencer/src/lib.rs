//! The checkout sequencer.
//!
//! Requests sharing a contention key (the product) are routed to the same
//! lane; a single consumer task per lane applies them strictly in arrival
//! order, so stock reservation and order creation for one product are
//! serialized by lane ordering instead of row locks. Outcomes travel back
//! to the submitting user over a push channel and stay queryable by
//! request id.

mod error;
mod push;
mod request;
mod sequencer;

pub use error::{Result, SequencerError};
pub use push::PushChannels;
pub use request::{CheckoutOutcome, CheckoutRequest, OutcomeKind, RequestHandler};
pub use sequencer::{Sequencer, SequencerConfig, partition_for};
