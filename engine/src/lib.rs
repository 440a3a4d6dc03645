//! Scenario command interpreter engine.
//!
//! The engine threads an immutable [`World`](world::World) through a
//! sequence of parsed events: each event resolves against the handler
//! [`Registry`](registry::Registry), binds typed arguments (recursing back
//! through the fetcher registry for composite values), executes, and is
//! followed by the invariant and expectation checks. Every mutation returns
//! a brand-new `World`; the chain backend behind
//! [`ChainBackend`](backend::ChainBackend) is the only external
//! collaborator.

#[cfg(test)]
pub(crate) mod testutil;

pub mod backend;
pub mod commands;
pub mod dispatch;
pub mod fetch;
pub mod invariant;
pub mod networks;
pub mod printer;
pub mod registry;
pub mod world;

pub use backend::{ChainBackend, Invokation, SimBackend};
pub use dispatch::{process_core_event, process_events, run_line, run_script};
pub use printer::{BufferPrinter, LogPrinter, Printer};
pub use registry::{Arg, Bindings, Command, Fetcher, Registry};
pub use world::World;
