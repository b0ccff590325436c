//! Lowering engine: expression nodes to linear rows.
//!
//! # Encodings
//!
//! | Node | Top level | Sub-expression |
//! |------|-----------|----------------|
//! | variable | declared | declared |
//! | view | no variable | no variable |
//! | sum | one row | auxiliary variable |
//! | relation, logic | hard rows | binary indicator, big-M rows |
//! | AllDifferent, Gcc | flow rows | rejected |
//! | objective | bound variable | rejected |
//!
//! Big-M constants are derived per row from the activity bounds of its
//! terms, so every variable taking part in a reified constraint must have
//! finite bounds.

mod builder;
mod config;
mod encode;
mod flow;
mod reify;

pub use builder::{ArrayId, ModelBuilder};
pub use config::LoweringConfig;
pub use flow::FlowBounds;
