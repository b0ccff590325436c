//! Linear constraint rows.

mod constraint;

pub use constraint::LinearConstraint;
