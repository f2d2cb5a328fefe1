//! Pure selection policies applied by the ledger.
//!
//! - `diff`: budget-constrained candidate selection
//! - `retention`: which versions fall outside the history window

pub mod diff;
pub mod retention;
