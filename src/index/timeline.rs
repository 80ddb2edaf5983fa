// 4.C.6 Timeline index: a dense array of (created_at, log_offset) pairs
// kept sorted newest-first, maintained by binary-search insert with a
// right shift of everything after the insertion point.
//
// Entry (16B): created_at:i64 log_offset:u64.

use std::path::Path;

use crate::error::{Error, Result};
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

const MAGIC: &[u8; 8] = b"NSTIDTIM";
const OFF_VERSION: usize = 8;
const OFF_FLAGS: usize = 12;
const OFF_CAPACITY: usize = 16;
const OFF_COUNT: usize = 24;
const VERSION: u32 = 1;
const ENTRY_SIZE: usize = 16;

pub const FILE_NAME: &str = "idx_timeline.dat";

pub struct TimelineIndex {
	file: MappedFile,
}

impl TimelineIndex {
	pub fn open(dir: &Path, default_size: u64) -> Result<TimelineIndex> {
		let (mut file, created) = MappedFile::open(dir, FILE_NAME, default_size)?;
		if created {
			let capacity = (file.len() - HEADER_SIZE as u64) / ENTRY_SIZE as u64;
			let slice = file.as_mut_slice();
			mapped_file::write_magic(slice, MAGIC);
			mapped_file::write_u32(slice, OFF_VERSION, VERSION);
			mapped_file::write_u32(slice, OFF_FLAGS, 0);
			mapped_file::write_u64(slice, OFF_CAPACITY, capacity);
			mapped_file::write_u64(slice, OFF_COUNT, 0);
			file.sync()?;
		} else {
			mapped_file::check_magic(file.as_slice(), MAGIC)?;
			if mapped_file::read_u32(file.as_slice(), OFF_VERSION) != VERSION {
				return Err(Error::VersionMismatch);
			}
		}
		Ok(TimelineIndex { file })
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}

	pub fn close(self) -> Result<()> {
		self.file.close()
	}

	pub fn capacity(&self) -> u64 {
		mapped_file::read_u64(self.file.as_slice(), OFF_CAPACITY)
	}

	pub fn count(&self) -> u64 {
		mapped_file::read_u64(self.file.as_slice(), OFF_COUNT)
	}

	fn entry_offset(&self, index: u64) -> usize {
		HEADER_SIZE + index as usize * ENTRY_SIZE
	}

	fn entry_at(&self, index: u64) -> (i64, u64) {
		let off = self.entry_offset(index);
		let slice = self.file.as_slice();
		(mapped_file::read_i64(slice, off), mapped_file::read_u64(slice, off + 8))
	}

	fn write_entry_at(&mut self, index: u64, created_at: i64, log_offset: u64) {
		let off = self.entry_offset(index);
		let slice = self.file.as_mut_slice();
		mapped_file::write_i64(slice, off, created_at);
		mapped_file::write_u64(slice, off + 8, log_offset);
	}

	/// First index whose entry has `created_at <= until` (array is
	/// descending, so this marks where the upper time bound starts).
	pub fn first_index_with_created_at_le(&self, until: i64) -> u64 {
		let mut low = 0u64;
		let mut high = self.count();
		while low < high {
			let mid = low + (high - low) / 2;
			if self.entry_at(mid).0 > until {
				low = mid + 1;
			} else {
				high = mid;
			}
		}
		low
	}

	/// One past the last index whose entry has `created_at >= since`.
	pub fn one_past_last_index_with_created_at_ge(&self, since: i64) -> u64 {
		let mut low = 0u64;
		let mut high = self.count();
		while low < high {
			let mid = low + (high - low) / 2;
			if self.entry_at(mid).0 >= since {
				low = mid + 1;
			} else {
				high = mid;
			}
		}
		low
	}

	pub fn insert(&mut self, created_at: i64, log_offset: u64) -> Result<()> {
		let count = self.count();
		if count >= self.capacity() {
			return Err(Error::Full);
		}
		let at = self.first_index_with_created_at_le(created_at);
		let mut i = count;
		while i > at {
			let (prev_ts, prev_off) = self.entry_at(i - 1);
			self.write_entry_at(i, prev_ts, prev_off);
			i -= 1;
		}
		self.write_entry_at(at, created_at, log_offset);
		mapped_file::write_u64(self.file.as_mut_slice(), OFF_COUNT, count + 1);
		Ok(())
	}

	pub fn iterate(&self, since: i64, until: i64, limit: u64, mut visit: impl FnMut(u64, i64) -> bool) {
		let start = if until == 0 { 0 } else { self.first_index_with_created_at_le(until) };
		let end = if since == 0 { self.count() } else { self.one_past_last_index_with_created_at_ge(since) };
		let mut seen = 0u64;
		let mut i = start;
		while i < end {
			if limit != 0 && seen >= limit {
				break;
			}
			let (created_at, log_offset) = self.entry_at(i);
			seen += 1;
			if !visit(log_offset, created_at) {
				break;
			}
			i += 1;
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("nostr-store-test");
			path.push("idx_timeline");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}
	}
	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	#[test]
	fn maintains_descending_order() {
		let dir = TempDir::new("maintains_descending_order");
		let mut idx = TimelineIndex::open(&dir.0, 64 * 1024).unwrap();
		idx.insert(1000, 1).unwrap();
		idx.insert(3000, 2).unwrap();
		idx.insert(2000, 3).unwrap();
		let mut seen = Vec::new();
		idx.iterate(0, 0, 0, |off, _| {
			seen.push(off);
			true
		});
		assert_eq!(seen, vec![2, 3, 1]);
	}

	#[test]
	fn time_window_and_limit() {
		let dir = TempDir::new("time_window_and_limit");
		let mut idx = TimelineIndex::open(&dir.0, 64 * 1024).unwrap();
		for (ts, off) in [(1000, 1), (2000, 2), (3000, 3), (4000, 4)] {
			idx.insert(ts, off).unwrap();
		}
		let mut seen = Vec::new();
		idx.iterate(2000, 3000, 0, |off, _| {
			seen.push(off);
			true
		});
		assert_eq!(seen, vec![3, 2]);

		let mut limited = Vec::new();
		idx.iterate(0, 0, 2, |off, _| {
			limited.push(off);
			true
		});
		assert_eq!(limited, vec![4, 3]);
	}

	#[test]
	fn full_when_capacity_exhausted() {
		let dir = TempDir::new("full_when_capacity_exhausted");
		let mut idx = TimelineIndex::open(&dir.0, HEADER_SIZE as u64 + ENTRY_SIZE as u64 * 2).unwrap();
		idx.insert(1, 1).unwrap();
		idx.insert(2, 2).unwrap();
		assert!(matches!(idx.insert(3, 3), Err(Error::Full)));
	}
}
