/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The trie engine: turns one half-open key range into a sequence of
//! range-writes across tbl24 and the tbl8 pages, allocating and recycling
//! pages as needed.
//!
//! This is a direct structural port of the reference algorithm (common-root
//! descent, left/right edge descent with asymmetric fill semantics, and
//! bottom-up recycling), translated from a pointer-walking C routine into
//! one operating on a [`Cursor`]-addressed arena. See `DESIGN.md` for the
//! file this is grounded on.

use crate::{
    error::Error,
    pool::Tbl8Pool,
    store::{is_extension, make_extension, make_terminal, page_of, terminal_value, Cursor, PackedStore},
    width::Width,
};

/// Which boundary of the interval a `write_edge` call is filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Left,
    Right,
}

/// Reads `len` bytes starting at `start` as a big-endian integer.
fn combine(bytes: &[u8], start: usize, len: usize) -> usize {
    let mut v: usize = 0;
    for b in &bytes[start..start + len] {
        v = (v << 8) | *b as usize;
    }
    v
}

/// Allocates a fresh tbl8 page, fills it with `fill_val`, and returns its
/// index. Bundles [`Tbl8Pool::alloc`] with the fill the reference performs
/// as part of its own `tbl8_alloc`.
fn alloc_page<W: Width>(
    store: &mut PackedStore<W>,
    pool: &mut Tbl8Pool,
    fill_val: u64,
) -> Result<u32, Error> {
    let idx = pool.alloc()?;
    store.fill_page(idx, fill_val);
    Ok(idx)
}

/// Reads entry 0 of `page`; if all 256 entries equal it and it is not
/// itself an extension, the page is uniform and is recycled: it is cleared,
/// returned to the pool, and the uniform value is reported so the caller
/// can fold it into its own parent entry. Otherwise `parent_val` is
/// returned unchanged.
fn recycle_page<W: Width>(store: &mut PackedStore<W>, pool: &mut Tbl8Pool, page: u32, parent_val: u64) -> u64 {
    let first = store.get(Cursor::Page(page), 0);
    if is_extension(first) {
        return parent_val;
    }
    for i in 1..crate::store::TBL8_PAGE_ENTRIES {
        if store.get(Cursor::Page(page), i) != first {
            return parent_val;
        }
    }
    store.clear_page(page);
    pool.free(page);
    first
}

/// Walks from tbl24 down through tbl8 pages, one byte per level, up to
/// `common_bytes` levels, allocating pages along the way as needed so the
/// path becomes concrete. Returns the cursor of the *common root table*: the
/// page (or tbl24, if `common_bytes < 3`) at which `ledge` and `redge` first
/// diverge.
fn build_common_root<W: Width>(
    store: &mut PackedStore<W>,
    pool: &mut Tbl8Pool,
    ledge: &[u8; 16],
    common_bytes: usize,
) -> Result<Cursor, Error> {
    let mut cursor = Cursor::Root;
    let mut j = 0usize;
    let mut i = 3usize;
    while i <= common_bytes {
        let idx = if matches!(cursor, Cursor::Root) {
            combine(ledge, 0, 3)
        } else {
            ledge[j] as usize
        };
        let val = store.get(cursor, idx);
        let page = if is_extension(val) {
            page_of(val)
        } else {
            let new_page = alloc_page(store, pool, val)?;
            store.put(cursor, idx, make_extension(new_page), 1);
            new_page
        };
        cursor = Cursor::Page(page);
        j = i;
        i += 1;
    }
    Ok(cursor)
}

/// Descends `len` further byte-levels from `(cursor, idx)`, allocating
/// pages as needed, then fills the side of the freshly-concrete page that
/// belongs to `nh` (strictly after the ledge byte for [`Edge::Left`],
/// strictly before the redge byte for [`Edge::Right`]) and attempts to
/// recycle the page. Recycling here targets a *local* candidate value, not
/// the live entry directly: only the final `store.put` below commits it,
/// so a page that turns out non-uniform never has its real parent slot
/// disturbed mid-walk.
fn write_edge<W: Width>(
    store: &mut PackedStore<W>,
    pool: &mut Tbl8Pool,
    ip_tail: &[u8],
    nh: u64,
    len: usize,
    edge: Edge,
    cursor: Cursor,
    idx: usize,
) -> Result<(), Error> {
    let mut val = make_terminal(nh);
    if len != 0 {
        val = store.get(cursor, idx);
        let page = if is_extension(val) {
            page_of(val)
        } else {
            let p = alloc_page(store, pool, val)?;
            val = make_extension(p);
            p
        };
        write_edge(store, pool, &ip_tail[1..], nh, len - 1, edge, Cursor::Page(page), ip_tail[0] as usize)?;
        match edge {
            Edge::Left => {
                let from = ip_tail[0] as usize + 1;
                if from < crate::store::TBL8_PAGE_ENTRIES {
                    store.put(Cursor::Page(page), from, make_terminal(nh), crate::store::TBL8_PAGE_ENTRIES - from);
                }
            }
            Edge::Right => {
                let count = ip_tail[0] as usize;
                if count > 0 {
                    store.put(Cursor::Page(page), 0, make_terminal(nh), count);
                }
            }
        }
        val = recycle_page(store, pool, page, val);
    }
    store.put(cursor, idx, val, 1);
    Ok(())
}

/// Bottom-up pass along the original top-down path (tbl24 → page at byte 3
/// → … → the common root table), recycling each page so a page that became
/// uniform as a side effect of the edge writes collapses into its parent.
/// Unlike [`write_edge`], this walk already holds a direct handle to the
/// real entry at each level and may overwrite it in place.
fn recycle_root_path<W: Width>(
    store: &mut PackedStore<W>,
    pool: &mut Tbl8Pool,
    ip_tail: &[u8],
    common_tbl8: usize,
    cursor: Cursor,
    idx: usize,
) {
    let val = store.get(cursor, idx);
    if !is_extension(val) {
        return;
    }
    let page = page_of(val);
    if common_tbl8 != 0 {
        recycle_root_path(store, pool, &ip_tail[1..], common_tbl8 - 1, Cursor::Page(page), ip_tail[0] as usize);
    }
    let new_val = recycle_page(store, pool, page, val);
    if new_val != val {
        store.put(cursor, idx, new_val, 1);
    }
}

/// Rewrites the trie so every key `k` with `ledge <= k < r` maps to
/// `nh`, assuming the caller (the modify driver) has already established
/// that no longer prefix covers any `k` in that range. `r = None` stands
/// for the exclusive bound `2^128`.
pub fn install_range<W: Width>(
    store: &mut PackedStore<W>,
    pool: &mut Tbl8Pool,
    ledge: u128,
    r: Option<u128>,
    nh: u64,
) -> Result<(), Error> {
    let ledge_bytes = ledge.to_be_bytes();
    let redge_bytes = crate::addr::dec_or_max(r).to_be_bytes();

    let common_bytes = (0..15)
        .find(|&i| ledge_bytes[i] != redge_bytes[i])
        .unwrap_or(15);

    let cursor = build_common_root(store, pool, &ledge_bytes, common_bytes)?;

    let first_tbl8_byte = common_bytes.max(3);

    let mut i = 15;
    while i > first_tbl8_byte && ledge_bytes[i] == 0 {
        i -= 1;
    }
    let llen = i - first_tbl8_byte + usize::from(common_bytes < 3);

    let mut i = 15;
    while i > first_tbl8_byte && redge_bytes[i] == 0xff {
        i -= 1;
    }
    let rlen = i - first_tbl8_byte + usize::from(common_bytes < 3);

    let (first_byte_idx, first_idx_len) = if common_bytes < 3 { (0, 3) } else { (common_bytes, 1) };
    let left_idx = combine(&ledge_bytes, first_byte_idx, first_idx_len);
    let right_idx = combine(&redge_bytes, first_byte_idx, first_idx_len);

    let tail_start = first_tbl8_byte + usize::from(common_bytes >= 3);

    write_edge(store, pool, &ledge_bytes[tail_start..], nh, llen, Edge::Left, cursor, left_idx)?;

    if right_idx > left_idx + 1 {
        store.put(cursor, left_idx + 1, make_terminal(nh), right_idx - (left_idx + 1));
    }

    write_edge(store, pool, &redge_bytes[tail_start..], nh, rlen, Edge::Right, cursor, right_idx)?;

    let common_tbl8 = if common_bytes < 3 { 0 } else { common_bytes - 2 };
    let root_idx = combine(&ledge_bytes, 0, 3);
    recycle_root_path(store, pool, &ledge_bytes[3..], common_tbl8, Cursor::Root, root_idx);

    Ok(())
}

/// Looks up a single key: index tbl24 by the first 3 bytes, then follow
/// extension entries one byte at a time until a terminal entry is reached.
pub fn lookup_one<W: Width>(store: &PackedStore<W>, key: u128) -> u64 {
    let bytes = key.to_be_bytes();
    let idx = combine(&bytes, 0, 3);
    let mut val = store.get(Cursor::Root, idx);
    let mut i = 3;
    while is_extension(val) && i < 16 {
        let page = page_of(val);
        val = store.get(Cursor::Page(page), bytes[i] as usize);
        i += 1;
    }
    terminal_value(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PackedStore;

    fn store_with(num_tbl8: u32, def_nh: u64) -> (PackedStore<u32>, Tbl8Pool) {
        (PackedStore::new(num_tbl8, def_nh), Tbl8Pool::new(num_tbl8))
    }

    #[test]
    fn install_range_at_tbl24_granularity() {
        let (mut store, mut pool) = store_with(4, 0);
        let base = 0x2001_0db8_0000_0000_0000_0000_0000_0000u128;
        install_range(&mut store, &mut pool, base, crate::addr::step(base, 32), 0x11).unwrap();
        assert_eq!(lookup_one(&store, base | 1), 0x11);
        assert_eq!(lookup_one(&store, base - (1u128 << 96)), 0);
    }

    #[test]
    fn install_range_deeper_than_24_allocates_and_recycles() {
        let (mut store, mut pool) = store_with(4, 0);
        let base = 0x2001_0db8_0000_0000_0000_0000_0000_0000u128;
        install_range(&mut store, &mut pool, base, crate::addr::step(base, 32), 0x11).unwrap();
        let inner = 0x2001_0db8_0001_0000_0000_0000_0000_0000u128;
        install_range(&mut store, &mut pool, inner, crate::addr::step(inner, 48), 0x22).unwrap();
        assert_eq!(lookup_one(&store, inner | 1), 0x22);
        assert_eq!(lookup_one(&store, base | 1), 0x11);

        // deleting the inner range re-installs the outer value and must
        // recycle the page(s) it allocated back to uniform terminals.
        let live_before = pool.live_count();
        install_range(&mut store, &mut pool, inner, crate::addr::step(inner, 48), 0x11).unwrap();
        assert_eq!(lookup_one(&store, inner | 1), 0x11);
        assert!(pool.live_count() < live_before);
    }

    #[test]
    fn install_range_covering_whole_space_handles_depth_zero() {
        let (mut store, mut pool) = store_with(2, 0);
        install_range(&mut store, &mut pool, 0, crate::addr::step(0, 0), 0x99).unwrap();
        assert_eq!(lookup_one(&store, 1), 0x99);
        assert_eq!(lookup_one(&store, u128::MAX), 0x99);
    }

    #[test]
    fn exhausted_pool_reports_out_of_space() {
        let (mut store, mut pool) = store_with(0, 0);
        let inner = 0x2001_0db8_0001_0000_0000_0000_0000_0000u128;
        let err = install_range(&mut store, &mut pool, inner, crate::addr::step(inner, 48), 0x22).unwrap_err();
        assert_eq!(err, Error::OutOfSpace);
    }
}
