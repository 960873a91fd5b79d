/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! An IPv6 longest-prefix-match forwarding table built as a multi-level
//! stride trie: a fixed `2^24`-entry first-level table (tbl24) backed by a
//! pool of 256-entry second-level pages (tbl8), generalized to 128-bit keys.
//!
//! [`Fib`] is the entry point: configure one with [`Config`], add and
//! remove prefixes with [`Fib::add`]/[`Fib::del`], and resolve a bulk
//! lookup closure once with [`Fib::get_lookup_fn`] for the hot path.
//!
//! The routing information base itself — the sorted collection of
//! installed prefixes the modify driver consults to find what, if
//! anything, still covers a range after a delete — is modeled behind the
//! [`RoutingTable`] trait. [`Rib`] is this crate's own minimal
//! implementation; callers with their own RIB can plug it in via
//! [`Fib::create_with_rib`].

mod addr;
mod error;
mod lookup;
mod modify;
mod pool;
mod rib;
mod store;
mod trie;
mod width;

pub use error::Error;
pub use lookup::{LookupFn, LookupType};
pub use modify::{Config, Fib};
pub use rib::{Rib, RibEntry, RoutingTable};
pub use width::NhSize;
