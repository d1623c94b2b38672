//! Mail relay: inbound email webhook to AI endpoint.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod relay;
pub mod webhook;
