//! Wire-protocol adapters. Each adapter owns one client dialect end to end:
//! parsing the inbound body into the canonical form and rendering answers,
//! stream fragments, and errors back into that dialect's envelopes. Handlers
//! never build protocol JSON themselves.

pub mod ollama;
pub mod openai;
pub mod simple;
