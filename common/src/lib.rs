//! Scenario DSL language layer.
//!
//! Pure data types shared by the interpreter engine and the repl: the
//! [`Event`](event::Event) AST, the closed [`Value`](value::Value) sum,
//! raw-mantissa [`Number`](number::Number)s, the line-oriented parser and
//! the macro substitution pass. No I/O happens here.

pub mod error;
pub mod event;
pub mod macros;
pub mod number;
pub mod parser;
pub mod value;

pub use error::{ParseError, ScenarioError};
pub use event::Event;
pub use macros::MacroTable;
pub use number::Number;
pub use value::Value;

/// Wrap an `async fn` handler into the pinned-box callback shape expected
/// by command and fetcher tables.
#[macro_export]
macro_rules! async_handler {
    ($func: expr) => {
        |world, args| Box::pin($func(world, args))
    };
}
