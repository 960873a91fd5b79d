/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Bulk lookup function selection. A caller picks a [`LookupType`] once and
//! gets back a closure that resolves the width dispatch a single time rather
//! than per key, so the hot loop over keys never re-checks which width it
//! is running against.
//!
//! The SIMD-accelerated kernel itself is a named external collaborator out
//! of this core's scope: this crate never hands back a
//! working `VectorAvx512` closure. `vector_kernel_available` is kept as a
//! `cfg-if`-gated hook so that wiring in a real kernel later is additive at
//! this one dispatch point rather than a rewrite of it; today it cannot
//! change the outcome of [`Fib::get_lookup_fn`] since there is no kernel on
//! the other end of it to dispatch to, but [`Fib::host_supports_vector_kernel`]
//! surfaces the raw detection result for an outer FIB layer that does own
//! one and wants to decide whether to load it.

use crate::modify::Fib;
use crate::rib::RoutingTable;

/// Which lookup kernel to hand back. `VectorAvx512` has no implementation
/// in this crate — see the module doc — and is always unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupType {
    Scalar,
    VectorAvx512,
    Default,
}

/// A resolved bulk-lookup closure: one next-hop per input key, in order.
pub type LookupFn<'a> = Box<dyn Fn(&[[u8; 16]]) -> Vec<u64> + 'a>;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        fn vector_kernel_available() -> bool {
            is_x86_feature_detected!("avx512f")
        }
    } else {
        fn vector_kernel_available() -> bool {
            false
        }
    }
}

impl<R: RoutingTable> Fib<R> {
    /// Returns a bulk lookup closure for `ty`, or `None` if that kernel is
    /// not available. No vectorized kernel is implemented by this crate, so
    /// `VectorAvx512` is always `None`; `Default` prefers it when a future
    /// kernel is wired in and otherwise falls back to `Scalar`, which is
    /// unconditionally available.
    pub fn get_lookup_fn(&self, ty: LookupType) -> Option<LookupFn<'_>> {
        match ty {
            LookupType::VectorAvx512 => self.vector_lookup_fn(),
            LookupType::Scalar => Some(self.scalar_lookup_fn()),
            LookupType::Default => self.vector_lookup_fn().or_else(|| Some(self.scalar_lookup_fn())),
        }
    }

    /// Whether the host CPU could run a vector kernel, independent of
    /// whether this crate has one to offer — for a FIB wrapper that owns
    /// its own SIMD kernel and needs to decide whether to load it.
    pub fn host_supports_vector_kernel(&self) -> bool {
        vector_kernel_available()
    }

    /// Always `None`: this crate carries no vector kernel implementation,
    /// regardless of what [`vector_kernel_available`] reports.
    fn vector_lookup_fn(&self) -> Option<LookupFn<'_>> {
        None
    }

    fn scalar_lookup_fn(&self) -> LookupFn<'_> {
        Box::new(move |keys: &[[u8; 16]]| keys.iter().map(|k| self.lookup(*k)).collect())
    }
}
