//! Command Module
//!
//! The command table and everything that runs when a message matches it.
//!
//! ## Architecture
//!
//! ```text
//! Client line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Analyzer       │  (connection module)
//! └────────┬────────┘
//!          │ find(msg): first match wins
//!          ▼
//! ┌─────────────────┐
//! │ CommandTable    │  (this module)
//! │                 │
//! │  - help         │
//! │  - exit         │
//! │  - ...          │
//! └────────┬────────┘
//!          │ handle(server, conn, msg)
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │──> writes to the connection
//! └─────────────────┘
//! ```

pub mod builtin;
pub mod table;

// Re-export the table types and the default command set
pub use builtin::{default_table, Exit, Help};
pub use table::{
    handler_fn, CommandEntry, CommandHandler, CommandTable, Flow, HandlerError, HandlerResult,
    Reply,
};
