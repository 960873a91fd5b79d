/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The modify driver and the public [`Fib`] handle: translates one
//! RIB-level prefix add/delete into a sequence of [`crate::trie::install_range`]
//! calls, and owns the `rsvd_tbl8s` admission-gate accounting.

use crate::{
    addr::{mask, step},
    error::Error,
    pool::Tbl8Pool,
    rib::{Rib, RoutingTable},
    store::PackedStore,
    trie::{install_range, lookup_one},
    width::{NhSize, Width},
};

/// Validated, immutable-after-create configuration for a [`Fib`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub nh_size: NhSize,
    pub num_tbl8: u32,
    pub def_nh: u64,
}

impl Config {
    /// Validates `nh_size`/`num_tbl8`/`def_nh` up front so `Fib::create`
    /// never has to reject a configuration after reserving memory.
    pub fn new(nh_size: NhSize, num_tbl8: u32, def_nh: u64) -> Result<Self, Error> {
        let max_nh = nh_size.max_nh();
        if num_tbl8 == 0 || u64::from(num_tbl8) > max_nh {
            return Err(Error::InvalidArgument);
        }
        if def_nh > max_nh {
            return Err(Error::InvalidArgument);
        }
        Ok(Config { nh_size, num_tbl8, def_nh })
    }
}

fn ceil8(bits: u32) -> u32 {
    (bits + 7) / 8 * 8
}

struct Inner<W: Width, R: RoutingTable> {
    store: PackedStore<W>,
    pool: Tbl8Pool,
    rib: R,
    def_nh: u64,
    rsvd_tbl8s: u32,
}

impl<W: Width, R: RoutingTable> Inner<W, R> {
    fn new(num_tbl8: u32, def_nh: u64, rib: R) -> Self {
        Self {
            store: PackedStore::new(num_tbl8, def_nh),
            pool: Tbl8Pool::new(num_tbl8),
            rib,
            def_nh,
            rsvd_tbl8s: 0,
        }
    }

    fn add(&mut self, ip_masked: u128, depth: u8, next_hop: u64) -> Result<(), Error> {
        if let Some(existing) = self.rib.lookup_exact(ip_masked, depth) {
            if existing.next_hop == next_hop {
                return Ok(());
            }
            self.modify_dp(ip_masked, depth, next_hop)?;
            self.rib.set_next_hop(ip_masked, depth, next_hop);
            return Ok(());
        }

        let mut depth_diff = 0u32;
        if depth > 24 {
            let floor_depth = (depth / 8) * 8;
            let has_deeper_sibling = self.rib.next_covered(ip_masked, floor_depth, ip_masked).is_some();
            if !has_deeper_sibling {
                let parent_depth = self
                    .rib
                    .lookup(ip_masked)
                    .map(|n| core::cmp::max(n.depth as u32, 24))
                    .unwrap_or(24);
                depth_diff = (ceil8(depth as u32) - ceil8(parent_depth)) / 8;
            }
            if self.rsvd_tbl8s + depth_diff > self.pool.capacity() {
                return Err(Error::OutOfSpace);
            }
        }

        // A parent-match means no dataplane write (and so no page) is ever
        // committed for this node; record that on the node itself rather
        // than the full pre-computed `depth_diff`, so a later delete of
        // this node subtracts exactly what this add actually reserved.
        let needs_rewrite = match self.rib.parent(ip_masked, depth) {
            Some(parent) => parent.next_hop != next_hop,
            None => true,
        };
        let recorded_depth_diff = if needs_rewrite { depth_diff } else { 0 };

        self.rib.insert(ip_masked, depth, next_hop, recorded_depth_diff);

        if !needs_rewrite {
            return Ok(());
        }

        if let Err(e) = self.modify_dp(ip_masked, depth, next_hop) {
            self.rib.remove(ip_masked, depth);
            return Err(e);
        }

        self.rsvd_tbl8s += recorded_depth_diff;
        Ok(())
    }

    fn del(&mut self, ip_masked: u128, depth: u8) -> Result<(), Error> {
        let node = self.rib.lookup_exact(ip_masked, depth).ok_or(Error::NotFound)?;
        let parent = self.rib.parent(ip_masked, depth);
        let need_rewrite = match parent {
            Some(p) => p.next_hop != node.next_hop,
            None => true,
        };
        let replacement = parent.map(|p| p.next_hop).unwrap_or(self.def_nh);
        if need_rewrite {
            self.modify_dp(ip_masked, depth, replacement)?;
        }
        self.rib.remove(ip_masked, depth);
        self.rsvd_tbl8s = self.rsvd_tbl8s.saturating_sub(node.depth_diff);
        Ok(())
    }

    /// Carves `[ip_masked, ip_masked + 2^(128-depth))` into maximal
    /// sub-ranges not shadowed by a more specific RIB entry, installing
    /// `nh` over each.
    fn modify_dp(&mut self, ip_masked: u128, depth: u8, nh: u64) -> Result<(), Error> {
        let mut ledge = ip_masked;
        loop {
            match self.rib.next_covered(ip_masked, depth, ledge) {
                Some(covered) => {
                    if ledge < covered.ip {
                        install_range(&mut self.store, &mut self.pool, ledge, Some(covered.ip), nh)?;
                    }
                    match step(covered.ip, covered.depth) {
                        Some(next) => ledge = next,
                        None => return Ok(()),
                    }
                }
                None => {
                    let r = step(ip_masked, depth);
                    let nonempty = match r {
                        Some(v) => ledge < v,
                        None => true,
                    };
                    if nonempty {
                        install_range(&mut self.store, &mut self.pool, ledge, r, nh)?;
                    }
                    return Ok(());
                }
            }
        }
    }

    fn lookup(&self, key: u128) -> u64 {
        lookup_one(&self.store, key)
    }
}

enum Dataplane<R: RoutingTable> {
    Width16(Inner<u16, R>),
    Width32(Inner<u32, R>),
    Width64(Inner<u64, R>),
}

/// The forwarding-information-base handle: the packed tables, the pool,
/// and the RIB the modify driver consumes, behind one width-resolved
/// dispatch over the packed entry's underlying integer width.
///
/// `destroy` in the reference is this type's ordinary `Drop`; there is no
/// separate destroy method.
pub struct Fib<R: RoutingTable = Rib> {
    name: String,
    dp: Dataplane<R>,
}

impl Fib<Rib> {
    /// Creates a handle backed by this crate's own minimal [`Rib`].
    pub fn create(name: impl Into<String>, config: Config) -> Result<Self, Error> {
        Self::create_with_rib(name, config, Rib::new())
    }
}

impl<R: RoutingTable> Fib<R> {
    /// Creates a handle backed by a caller-supplied `RoutingTable`.
    pub fn create_with_rib(name: impl Into<String>, config: Config, rib: R) -> Result<Self, Error> {
        let dp = match config.nh_size {
            NhSize::Bits16 => Dataplane::Width16(Inner::new(config.num_tbl8, config.def_nh, rib)),
            NhSize::Bits32 => Dataplane::Width32(Inner::new(config.num_tbl8, config.def_nh, rib)),
            NhSize::Bits64 => Dataplane::Width64(Inner::new(config.num_tbl8, config.def_nh, rib)),
        };
        Ok(Fib { name: name.into(), dp })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds (or updates) the next-hop for `ip/depth`.
    pub fn add(&mut self, ip: [u8; 16], depth: u8, next_hop: u64) -> Result<(), Error> {
        let max_nh = self.nh_size().max_nh();
        if depth > 128 || next_hop > max_nh {
            return Err(Error::InvalidArgument);
        }
        let ip_masked = mask(u128::from_be_bytes(ip), depth);
        match &mut self.dp {
            Dataplane::Width16(inner) => inner.add(ip_masked, depth, next_hop),
            Dataplane::Width32(inner) => inner.add(ip_masked, depth, next_hop),
            Dataplane::Width64(inner) => inner.add(ip_masked, depth, next_hop),
        }
    }

    /// Deletes the exact prefix `ip/depth`.
    pub fn del(&mut self, ip: [u8; 16], depth: u8) -> Result<(), Error> {
        if depth > 128 {
            return Err(Error::InvalidArgument);
        }
        let ip_masked = mask(u128::from_be_bytes(ip), depth);
        match &mut self.dp {
            Dataplane::Width16(inner) => inner.del(ip_masked, depth),
            Dataplane::Width32(inner) => inner.del(ip_masked, depth),
            Dataplane::Width64(inner) => inner.del(ip_masked, depth),
        }
    }

    /// A single-key lookup, for tests and for callers not using the bulk
    /// `get_lookup_fn` path.
    pub fn lookup(&self, ip: [u8; 16]) -> u64 {
        let key = u128::from_be_bytes(ip);
        match &self.dp {
            Dataplane::Width16(inner) => inner.lookup(key),
            Dataplane::Width32(inner) => inner.lookup(key),
            Dataplane::Width64(inner) => inner.lookup(key),
        }
    }

    pub fn nh_size(&self) -> NhSize {
        match &self.dp {
            Dataplane::Width16(_) => NhSize::Bits16,
            Dataplane::Width32(_) => NhSize::Bits32,
            Dataplane::Width64(_) => NhSize::Bits64,
        }
    }

    /// Number of tbl8 pages currently committed to installed prefixes
    /// deeper than 24, as tracked by the pre-write admission gate in
    /// [`Inner::add`].
    pub fn rsvd_tbl8s(&self) -> u32 {
        match &self.dp {
            Dataplane::Width16(inner) => inner.rsvd_tbl8s,
            Dataplane::Width32(inner) => inner.rsvd_tbl8s,
            Dataplane::Width64(inner) => inner.rsvd_tbl8s,
        }
    }
}


/// Property-based checks of LPM correctness, round-trip, and idempotence
/// over arbitrary sequences of mutations, rather than fixed examples.
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::width::NhSize;
    use proptest::prelude::*;
    use std::collections::HashMap;

    /// A narrow address/depth/next-hop alphabet keeps mutation sequences
    /// short enough for proptest's shrinker while still exercising nesting,
    /// overlap and tbl8-depth branches (depths straddle 24 in both
    /// directions).
    #[derive(Debug, Clone, Copy)]
    enum Op {
        Add(u128, u8, u64),
        Del(u128, u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let depth = prop_oneof![Just(0u8), Just(8), Just(16), Just(24), Just(32), Just(40), Just(48)];
        let top = 0u128..4;
        prop_oneof![
            (top.clone(), depth.clone(), 1u64..8)
                .prop_map(|(t, d, nh)| Op::Add(mask(t << 120, d), d, nh)),
            (top, depth).prop_map(|(t, d)| Op::Del(mask(t << 120, d), d)),
        ]
    }

    /// Naive reference model: the deepest entry whose masked prefix matches
    /// `key`, or `def_nh` if none covers it.
    fn reference_lookup(model: &HashMap<(u128, u8), u64>, key: u128, def_nh: u64) -> u64 {
        model
            .iter()
            .filter(|((ip, depth), _)| mask(key, *depth) == *ip)
            .max_by_key(|((_, depth), _)| *depth)
            .map(|(_, nh)| *nh)
            .unwrap_or(def_nh)
    }

    /// A handful of representative probe keys per top-level branch: the
    /// branch's own base address, its last address, and the two addresses
    /// either side of the branch boundary.
    fn probe_keys() -> Vec<u128> {
        let mut keys = Vec::new();
        for top in 0u128..4 {
            let base = top << 120;
            keys.push(base);
            keys.push(base | 1);
            keys.push(base | ((1u128 << 120) - 1));
        }
        keys
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn lpm_matches_reference_model_after_random_mutations(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let def_nh = 0u64;
            let mut fib = Fib::create("prop", Config::new(NhSize::Bits32, 64, def_nh).unwrap()).unwrap();
            let mut model: HashMap<(u128, u8), u64> = HashMap::new();

            for op in ops {
                match op {
                    Op::Add(masked, depth, nh) => {
                        if fib.add(masked.to_be_bytes(), depth, nh).is_ok() {
                            model.insert((masked, depth), nh);
                        }
                    }
                    Op::Del(masked, depth) => {
                        let existed = model.remove(&(masked, depth)).is_some();
                        prop_assert_eq!(fib.del(masked.to_be_bytes(), depth).is_ok(), existed);
                    }
                }
            }

            for key in probe_keys() {
                prop_assert_eq!(fib.lookup(key.to_be_bytes()), reference_lookup(&model, key, def_nh));
            }
        }

        #[test]
        fn add_then_delete_restores_pre_insert_lookups(
            top in 0u128..4,
            depth in prop_oneof![Just(8u8), Just(16), Just(24), Just(32), Just(40)],
            nh in 1u64..8,
        ) {
            let mut fib = Fib::create("prop", Config::new(NhSize::Bits32, 16, 0).unwrap()).unwrap();
            let masked = mask(top << 120, depth);
            let before: Vec<u64> = probe_keys().iter().map(|k| fib.lookup(k.to_be_bytes())).collect();

            fib.add(masked.to_be_bytes(), depth, nh).unwrap();
            fib.del(masked.to_be_bytes(), depth).unwrap();

            let after: Vec<u64> = probe_keys().iter().map(|k| fib.lookup(k.to_be_bytes())).collect();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn re_adding_the_same_next_hop_is_a_no_op(
            top in 0u128..4,
            depth in prop_oneof![Just(8u8), Just(16), Just(24), Just(32), Just(40)],
            nh in 1u64..8,
        ) {
            let mut fib = Fib::create("prop", Config::new(NhSize::Bits32, 16, 0).unwrap()).unwrap();
            let masked = mask(top << 120, depth);
            fib.add(masked.to_be_bytes(), depth, nh).unwrap();
            let rsvd_before = fib.rsvd_tbl8s();

            fib.add(masked.to_be_bytes(), depth, nh).unwrap();

            prop_assert_eq!(fib.rsvd_tbl8s(), rsvd_before);
        }
    }
}
