//! Transport-free building blocks of a live agent session: the wire frame
//! codec, the agent pipeline contract, outbound shaping, heartbeat and
//! utterance state machines, and session records.

pub mod accumulator;
pub mod audio;
pub mod event;
pub mod frame;
pub mod liveness;
pub mod outbound;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod structured;
pub mod utterance;
