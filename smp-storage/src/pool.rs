//! The Pool façade: the single coarse-locked coordinator binding Arena and
//! Catalog, enforcing every cross-component invariant.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::arena::Arena;
use crate::catalog::{Catalog, Entry};
use crate::error::{Error, Result};
use crate::snapshot;

const MAX_DESCRIPTION_BYTES: usize = 255;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Page count needed to hold `size` bytes, reserving one trailing byte so a
/// NUL-terminated string read always has room to terminate within the
/// zero-padded tail (§4.1 "Numeric edge cases").
fn pages_needed(size: usize, page_bytes: usize) -> usize {
    (size + 1).div_ceil(page_bytes)
}

pub struct PageStats {
    pub total_pages: usize,
    pub free_pages: usize,
    pub used_pages: usize,
    pub max_free_run: usize,
    pub free_fragments: usize,
}

struct Inner {
    arena: Arena,
    catalog: Catalog,
}

/// Single exclusive critical section over Arena + Catalog. Every public
/// method here takes the same lock; there are no per-id locks and no
/// readers/writer split, per §5.
pub struct Pool {
    inner: Mutex<Inner>,
}

impl Pool {
    pub fn new(pool_bytes: usize, page_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                arena: Arena::new(pool_bytes, page_bytes),
                catalog: Catalog::new(),
            }),
        }
    }

    pub fn allocate(&self, description: &str, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(Error::InvalidParam("data must not be empty".into()));
        }
        if description.len() > MAX_DESCRIPTION_BYTES {
            return Err(Error::InvalidParam("description too long".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let n = pages_needed(data.len(), inner.arena.page_bytes());
        let start = Self::reserve_run(&mut inner, n)?;
        inner.arena.write_run(start, n, data);
        let id = inner.catalog.next_id();
        inner.catalog.put(&id, description, start, n, now_unix());
        Ok(id)
    }

    pub fn read(&self, id: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.catalog.get(id).ok_or(Error::NotFound)?;
        Ok(inner.arena.read_run(entry.first_page, entry.page_count))
    }

    pub fn update(&self, id: &str, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidParam("data must not be empty".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.catalog.get(id).ok_or(Error::NotFound)?;
        let page_bytes = inner.arena.page_bytes();
        let new_n = pages_needed(data.len(), page_bytes);

        if new_n <= entry.page_count {
            inner.arena.write_run(entry.first_page, new_n, data);
            if new_n < entry.page_count {
                let trailing_start = entry.first_page + new_n;
                let trailing_count = entry.page_count - new_n;
                inner.arena.mark_free(trailing_start, trailing_count);
                inner.catalog.set_page_count(id, new_n);
            }
            inner.catalog.touch(id, now_unix());
            Ok(())
        } else {
            let description = entry.description.clone();
            inner.arena.mark_free(entry.first_page, entry.page_count);
            inner.catalog.remove(id);
            let start = match Self::reserve_run(&mut inner, new_n) {
                Ok(start) => start,
                Err(e) => {
                    // Nothing left referencing the old range; the entry is
                    // already gone, matching the fail-at-the-boundary policy
                    // (state differs from pre-call only in the permitted
                    // shrink-observable sense).
                    return Err(e);
                }
            };
            inner.arena.write_run(start, new_n, data);
            inner
                .catalog
                .put(id, &description, start, new_n, now_unix());
            Ok(())
        }
    }

    pub fn free(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.catalog.get(id).ok_or(Error::NotFound)?;
        inner.arena.mark_free(entry.first_page, entry.page_count);
        inner.catalog.remove(id);
        Ok(())
    }

    pub fn compact(&self) {
        let mut inner = self.inner.lock().unwrap();
        let Inner { arena, catalog } = &mut *inner;
        arena.compact(catalog);
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.arena.reset();
        inner.catalog.reset();
    }

    pub fn snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        snapshot::save(&inner.arena, &inner.catalog, path.as_ref())
    }

    pub fn restore(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.arena.reset();
        inner.catalog.reset();
        let Inner { arena, catalog } = &mut *inner;
        snapshot::load(arena, catalog, path.as_ref())
    }

    pub fn iter_entries(&self) -> Vec<Entry> {
        let inner = self.inner.lock().unwrap();
        inner.catalog.iter_entries()
    }

    pub fn page_stats(&self) -> PageStats {
        let inner = self.inner.lock().unwrap();
        PageStats {
            total_pages: inner.arena.page_count(),
            free_pages: inner.arena.free_page_count(),
            used_pages: inner.arena.page_count() - inner.arena.free_page_count(),
            max_free_run: inner.arena.max_free_run(),
            free_fragments: inner.arena.free_fragment_count(),
        }
    }

    /// Allocation policy per §4.1: fail fast on insufficient total free
    /// space, try a direct first-fit, and fall back to compaction-then-retry
    /// otherwise.
    fn reserve_run(inner: &mut Inner, n: usize) -> Result<usize> {
        if n > inner.arena.free_page_count() {
            return Err(Error::OutOfMemory);
        }
        if let Some(start) = inner.arena.find_run(n) {
            inner.arena.mark_used(start, n);
            return Ok(start);
        }
        inner.arena.compact(&mut inner.catalog);
        match inner.arena.find_run(n) {
            Some(start) => {
                inner.arena.mark_used(start, n);
                Ok(start)
            }
            None => Err(Error::OutOfMemory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> Pool {
        Pool::new(16 * 4096, 4096)
    }

    #[test]
    fn allocate_read_round_trip() {
        let pool = small_pool();
        let id = pool.allocate("doc", b"Hello").unwrap();
        assert_eq!(id, "memory_00001");
        let data = pool.read(&id).unwrap();
        assert_eq!(data.len(), 4096);
        assert_eq!(&data[..5], b"Hello");
        assert!(data[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn allocate_exactly_page_bytes_needs_two_pages() {
        let pool = small_pool();
        let payload = vec![b'x'; 4096];
        let id = pool.allocate("d", &payload).unwrap();
        let stats_before = pool.page_stats();
        assert_eq!(stats_before.used_pages, 2);
        let data = pool.read(&id).unwrap();
        assert_eq!(data.len(), 8192);
    }

    #[test]
    fn update_in_place_shrink_frees_trailing_pages() {
        let pool = small_pool();
        let id = pool.allocate("d", &vec![1u8; 9000]).unwrap();
        assert_eq!(pool.page_stats().used_pages, 3);
        pool.update(&id, b"Hi").unwrap();
        assert_eq!(pool.page_stats().used_pages, 1);
        let data = pool.read(&id).unwrap();
        assert_eq!(&data[..2], b"Hi");
    }

    #[test]
    fn update_growing_reallocates() {
        let pool = small_pool();
        let id = pool.allocate("d", b"Hi").unwrap();
        pool.update(&id, &vec![7u8; 5000]).unwrap();
        let data = pool.read(&id).unwrap();
        assert_eq!(data.len(), 8192);
        assert!(data[..5000].iter().all(|&b| b == 7));
    }

    #[test]
    fn free_then_read_not_found() {
        let pool = small_pool();
        let id = pool.allocate("d", b"x").unwrap();
        pool.free(&id).unwrap();
        assert!(matches!(pool.read(&id), Err(Error::NotFound)));
    }

    #[test]
    fn fragmentation_triggers_compaction_on_allocate() {
        // 8-page pool, one page per blob.
        let pool = Pool::new(8 * 4096, 4096);
        let ids: Vec<String> = (0..8)
            .map(|i| pool.allocate(&format!("blob{i}"), &[i as u8]).unwrap())
            .collect();
        // Free the odd-indexed pages, leaving isolated one-page gaps at 1,3,5,7.
        for id in ids.iter().skip(1).step_by(2) {
            pool.free(id).unwrap();
        }
        assert_eq!(pool.page_stats().max_free_run, 1);
        assert_eq!(pool.page_stats().free_pages, 4);

        // Needs 2 contiguous pages: impossible without compaction, which
        // `reserve_run` falls back to automatically.
        let big = pool.allocate("big", &vec![9u8; 4097]).unwrap();
        let data = pool.read(&big).unwrap();
        assert!(data[..4097].iter().all(|&b| b == 9));
        // Survivors still read back correctly after the relocation.
        assert_eq!(pool.read(&ids[0]).unwrap()[0], 0);
        assert_eq!(pool.read(&ids[2]).unwrap()[0], 2);
    }

    #[test]
    fn allocate_rejects_empty_data() {
        let pool = small_pool();
        assert!(matches!(
            pool.allocate("d", b""),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn out_of_memory_when_pool_full() {
        let pool = small_pool();
        assert!(matches!(
            pool.allocate("d", &vec![0u8; 1_000_000]),
            Err(Error::OutOfMemory)
        ));
    }
}
