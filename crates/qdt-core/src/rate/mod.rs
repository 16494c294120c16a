//! Read-rate throttling.
//!
//! A [`RateLimit`] of zero means unlimited. A non-zero limit is enforced by
//! [`ThrottledReader`], which caps each read at one slice (a tenth of the
//! per-second budget) and sleeps when reads come back faster than the limit
//! allows.

mod budget;
mod throttled;

pub use budget::{RateBudget, RateLimit};
pub use throttled::ThrottledReader;
