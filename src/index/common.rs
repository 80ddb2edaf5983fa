// Shared 64-B index header (spec.md 3) and the bump-allocated entry pool
// that backs the per-key newest-first linked lists (spec.md 4.C.2/4/5,
// 9 "stable offsets"). Every bucketed index (pubkey, kind, pubkey+kind,
// tag) reads/writes through these helpers; only the id index (pure
// open-addressing, no lists) and the timeline index (sorted array, no
// pool) skip the pool half of this module.

use crate::error::{Error, Result};
use crate::mapped_file::{self, MappedFile};

pub const OFF_VERSION: usize = 8;
pub const OFF_FLAGS: usize = 12;
pub const OFF_BUCKET_COUNT: usize = 16;
pub const OFF_ENTRY_COUNT: usize = 24;
pub const OFF_POOL_NEXT_OFFSET: usize = 32;
pub const OFF_POOL_SIZE: usize = 40;

pub const VERSION: u32 = 1;

pub const STATE_EMPTY: u8 = 0;
pub const STATE_USED: u8 = 1;
pub const STATE_TOMBSTONE: u8 = 2;

/// A pool entry: log_offset:u64 created_at:i64 prev_entry_offset:u64.
pub const ENTRY_SIZE: usize = 24;

pub fn bucket_count(file: &MappedFile) -> u64 {
	mapped_file::read_u64(file.as_slice(), OFF_BUCKET_COUNT)
}

pub fn entry_count(file: &MappedFile) -> u64 {
	mapped_file::read_u64(file.as_slice(), OFF_ENTRY_COUNT)
}

pub fn set_entry_count(file: &mut MappedFile, value: u64) {
	mapped_file::write_u64(file.as_mut_slice(), OFF_ENTRY_COUNT, value);
}

pub fn pool_next_offset(file: &MappedFile) -> u64 {
	mapped_file::read_u64(file.as_slice(), OFF_POOL_NEXT_OFFSET)
}

pub fn pool_size(file: &MappedFile) -> u64 {
	mapped_file::read_u64(file.as_slice(), OFF_POOL_SIZE)
}

/// Initialises the shared header fields for a freshly-created index file.
/// `bucket_count` is fixed at init to fill the mapped region (spec.md 3
/// invariant 6); `pool_start`/`pool_size` carve out the remainder for the
/// bump-allocated entry pool.
pub fn init_header(file: &mut MappedFile, magic: &[u8; 8], bucket_count: u64, pool_start: u64, pool_size: u64) {
	let slice = file.as_mut_slice();
	mapped_file::write_magic(slice, magic);
	mapped_file::write_u32(slice, OFF_VERSION, VERSION);
	mapped_file::write_u32(slice, OFF_FLAGS, 0);
	mapped_file::write_u64(slice, OFF_BUCKET_COUNT, bucket_count);
	mapped_file::write_u64(slice, OFF_ENTRY_COUNT, 0);
	mapped_file::write_u64(slice, OFF_POOL_NEXT_OFFSET, pool_start);
	mapped_file::write_u64(slice, OFF_POOL_SIZE, pool_size);
}

pub fn validate_header(file: &MappedFile, magic: &[u8; 8]) -> Result<()> {
	mapped_file::check_magic(file.as_slice(), magic)?;
	if mapped_file::read_u32(file.as_slice(), OFF_VERSION) != VERSION {
		return Err(Error::VersionMismatch);
	}
	Ok(())
}

/// Bump-allocates a new pool entry holding `(log_offset, created_at,
/// prev_entry_offset)`, returning its absolute file offset. Entries are
/// never relocated or reclaimed (spec.md 9, Open Question 2).
pub fn alloc_entry(file: &mut MappedFile, log_offset: u64, created_at: i64, prev_entry_offset: u64) -> Result<u64> {
	// The pool occupies the tail of the file, so its bound is simply the
	// file length; `pool_size` (fixed at init) is kept only as a stat.
	let at = pool_next_offset(file);
	if at + ENTRY_SIZE as u64 > file.len() {
		return Err(Error::Full);
	}
	let slice = file.as_mut_slice();
	let w = at as usize;
	mapped_file::write_u64(slice, w, log_offset);
	mapped_file::write_i64(slice, w + 8, created_at);
	mapped_file::write_u64(slice, w + 16, prev_entry_offset);
	mapped_file::write_u64(file.as_mut_slice(), OFF_POOL_NEXT_OFFSET, at + ENTRY_SIZE as u64);
	set_entry_count(file, entry_count(file) + 1);
	Ok(at)
}

pub struct PoolEntry {
	pub log_offset: u64,
	pub created_at: i64,
	pub prev_entry_offset: u64,
}

pub fn read_entry(file: &MappedFile, at: u64) -> PoolEntry {
	let slice = file.as_slice();
	let r = at as usize;
	PoolEntry {
		log_offset: mapped_file::read_u64(slice, r),
		created_at: mapped_file::read_i64(slice, r + 8),
		prev_entry_offset: mapped_file::read_u64(slice, r + 16),
	}
}

/// Walks a per-key list newest-first (prepend order), applying the time
/// window and invoking `visit` until it returns false or `limit` entries
/// have been produced.
pub fn walk_list(
	file: &MappedFile,
	mut at: u64,
	since: i64,
	until: i64,
	limit: u64,
	mut visit: impl FnMut(u64, i64) -> bool,
) {
	let mut seen = 0u64;
	while at != 0 {
		if limit != 0 && seen >= limit {
			break;
		}
		let entry = read_entry(file, at);
		let in_window = (since == 0 || entry.created_at >= since) && (until == 0 || entry.created_at <= until);
		if in_window {
			seen += 1;
			if !visit(entry.log_offset, entry.created_at) {
				break;
			}
		}
		at = entry.prev_entry_offset;
	}
}
