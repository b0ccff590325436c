//! Symbolic constraint models lowered into flat mixed-integer linear programs.
//!
//! A model is a tree of expression nodes built through a
//! [`ModelBuilder`](lower::ModelBuilder): variables, affine views, weighted
//! sums, relations, boolean connectives, scheduling pairs, and the global
//! constraints AllDifferent and Gcc. Adding a root walks its tree
//! depth-first and encodes each node once into a [`FlatModel`](flat::FlatModel):
//!
//! - **Views** fold into their users' coefficients and create no variable.
//! - **Relations and logic** at top level become hard rows; nested, they
//!   get a binary indicator tied to the row by derived big-M constants.
//! - **AllDifferent / Gcc** become a transportation-flow relaxation.
//!
//! The flat model is then handed to a [`MipBackend`](backend::MipBackend).
//!
//! # Modules
//!
//! - [`expr`]: node arena types and containers
//! - [`linear`]: constraint rows and coefficient folding
//! - [`flat`]: the flat model handed to a backend
//! - [`lower`]: the builder and per-kind encoders
//! - [`backend`]: the backend trait, search configuration, a reference backend
//! - [`error`]: error type

pub mod backend;
pub mod error;
pub mod expr;
pub mod flat;
pub mod linear;
pub mod lower;

pub use error::{ModelError, Result};
pub use lower::ModelBuilder;
