//! Shared-resource governance: borrow leases and creation quotas.
//!
//! Ownership itself lives on the entity (`owned_by`); this module adds the
//! two cross-cutting policies layered on top of it. Both are enforced at
//! use time, not by background jobs.

mod borrow;
mod quota;

pub use borrow::{BorrowLedger, BorrowRecord};
pub use quota::{QuotaInfo, QuotaLimits, QuotaState, QuotaTracker};
