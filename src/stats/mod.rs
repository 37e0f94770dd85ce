//! Statistics Module
//!
//! Connection and command counters shared by every connection task.
//! The server only ever talks to the [`StatsStore`] trait, so an embedding
//! program can plug in its own store; [`Counters`] is the in-memory default.

pub mod counters;

pub use counters::{
    Counters, StatsStore, COMMANDS_DISPATCHED, COMMANDS_REJECTED, CONNECTIONS_ACCEPTED,
    CONNECTIONS_ACTIVE, PANICS_RECOVERED,
};
