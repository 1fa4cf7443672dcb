// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage and caching for resolved display identities.
//!
//! [`TagStore`] is the persistence seam (an in-memory [`MemoryStore`] is the
//! only implementation; nothing here survives a process restart, by design).
//! [`TagCache`] layers the caching policy on top: the fast path for repeat
//! reads, the "never cache a default bundle" rule which keeps
//! not-yet-permissioned users eligible for re-resolution, and the
//! preference-preserving revalidation used to pick up out-of-band permission
//! changes without a reconnect.
mod cache;
mod memory;
mod traits;

pub use cache::{Revalidation, TagCache};
pub use memory::MemoryStore;
pub use traits::{StoreError, TagStore};
