//! Heap ownership handles with explicit control-block bookkeeping.
//!
//! This crate provides three handle types over a heap-allocated object:
//! `Uniq` for exclusive move-only ownership, `Shared` for reference-counted
//! ownership, and `Weak` for non-owning observation of a `Shared` group.
//! Shared groups are backed by an anchor record holding the strong and weak
//! counts together with destroy/release operations captured, type-erased, at
//! the construction call that first bound a typed pointer to the group.
//!
//! Objects enter the system two ways: through the factories
//! ([`Uniq::new`], and [`Shared::new`], which co-allocates object and
//! anchor), or by adopting a raw heap pointer ([`Uniq::from_raw`],
//! [`Shared::from_raw`]). Adoption is unchecked: the pointer must come from
//! a fresh `Box` allocation that no other owner holds. The crate never
//! defends against a violated adoption precondition at runtime; see the
//! `# Safety` sections on those constructors.
//!
//! ```
//! use custody::Shared;
//!
//! let s1 = Shared::new(5);
//! let w = s1.alias();
//! let s2 = w.upgrade().unwrap();
//! assert_eq!(s2.strong_count(), 2);
//! assert_eq!(*s2, 5);
//! ```
//!
//! Handles are single-threaded: counts are plain cells and no handle is
//! `Send` or `Sync`. A concurrent variant would need atomic counts and a
//! single check-then-increment upgrade; none is provided here. The `tally`
//! feature (default) keeps a diagnostic ledger of live objects and
//! anchors, queryable through `stats`.

pub(crate) mod anchor;
pub(crate) mod ledger;
pub mod pointers;

pub use pointers::{Erased, Expired, Shared, Uniq, Weak};

#[cfg(feature = "tally")]
pub use ledger::{global_stats, stats, Stats};

#[cfg(test)]
mod tests;
