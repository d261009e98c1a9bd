//! Run-wide cancellation.
//!
//! One [`CancellationToken`] is shared by every job of a run. Cancelling it
//! (external interrupt or fail-fast) aborts every in-flight job; nothing
//! already stored is cleaned up.

mod token;

pub use token::CancellationToken;
