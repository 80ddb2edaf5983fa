// 4.C.5 Tag index: open-addressed buckets keyed on (single-byte tag name,
// 32-byte tag value prefix), each the head of a newest-first linked list.
// Only single-byte tag names are indexed; one entry per indexed tag per
// event (spec.md 4.C.5).
//
// Bucket (48B): tag_name:u8 tag_value[32] head:u64 count:u32 state:u8
// + padding.

use std::path::Path;

use crate::error::Result;
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

use super::common::{self, STATE_EMPTY, STATE_TOMBSTONE, STATE_USED};

const MAGIC: &[u8; 8] = b"NSTIDTAG";
const BUCKET_SIZE: usize = 56;
const OFF_NAME: usize = 0;
const OFF_VALUE: usize = 1;
const OFF_HEAD: usize = 33;
const OFF_COUNT: usize = 41;
const OFF_STATE: usize = 45;

pub const FILE_NAME: &str = "idx_tag.dat";

pub struct TagIndex {
	file: MappedFile,
}

/// `tag_name` mixed with the top 8 bytes of `tag_value`, per spec.md 4.C.5
/// ("tag_name XOR first-8-bytes-of-tag_value shifted into the high byte").
fn hash_tag(tag_name: u8, tag_value: &[u8; 32]) -> u64 {
	let mut buf = [0u8; 8];
	buf.copy_from_slice(&tag_value[0..8]);
	let v = u64::from_le_bytes(buf);
	v ^ ((tag_name as u64) << 56)
}

impl TagIndex {
	pub fn open(dir: &Path, default_size: u64) -> Result<TagIndex> {
		let (mut file, created) = MappedFile::open(dir, FILE_NAME, default_size)?;
		if created {
			let usable = file.len() - HEADER_SIZE as u64;
			let bucket_region = usable / 2;
			let bucket_count = (bucket_region / BUCKET_SIZE as u64).max(1);
			let pool_start = HEADER_SIZE as u64 + bucket_count * BUCKET_SIZE as u64;
			let pool_size = file.len() - pool_start;
			common::init_header(&mut file, MAGIC, bucket_count, pool_start, pool_size);
			file.sync()?;
		} else {
			common::validate_header(&file, MAGIC)?;
		}
		Ok(TagIndex { file })
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}

	pub fn close(self) -> Result<()> {
		self.file.close()
	}

	pub fn bucket_count(&self) -> u64 {
		common::bucket_count(&self.file)
	}

	pub fn entry_count(&self) -> u64 {
		common::entry_count(&self.file)
	}

	fn bucket_offset(&self, slot: u64) -> usize {
		HEADER_SIZE + slot as usize * BUCKET_SIZE
	}

	fn state_at(&self, slot: u64) -> u8 {
		self.file.as_slice()[self.bucket_offset(slot) + OFF_STATE]
	}

	fn key_at(&self, slot: u64) -> (u8, [u8; 32]) {
		let off = self.bucket_offset(slot);
		let slice = self.file.as_slice();
		let name = slice[off + OFF_NAME];
		let mut value = [0u8; 32];
		value.copy_from_slice(&slice[off + OFF_VALUE..off + OFF_VALUE + 32]);
		(name, value)
	}

	fn find_or_create_bucket(&mut self, tag_name: u8, tag_value: &[u8; 32]) -> Result<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_tag(tag_name, tag_value) % bucket_count;
		let mut slot = start;
		let mut first_free: Option<u64> = None;
		loop {
			match self.state_at(slot) {
				STATE_USED
					if self.key_at(slot) == (tag_name, *tag_value) => {
						return Ok(slot);
					}
				STATE_EMPTY => {
					let target = first_free.unwrap_or(slot);
					self.init_bucket(target, tag_name, tag_value);
					return Ok(target);
				}
				STATE_TOMBSTONE
					if first_free.is_none() => {
						first_free = Some(slot);
					}
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return Err(crate::error::Error::Full);
			}
		}
	}

	fn init_bucket(&mut self, slot: u64, tag_name: u8, tag_value: &[u8; 32]) {
		let off = self.bucket_offset(slot);
		let slice = self.file.as_mut_slice();
		slice[off + OFF_NAME] = tag_name;
		slice[off + OFF_VALUE..off + OFF_VALUE + 32].copy_from_slice(tag_value);
		mapped_file::write_u64(slice, off + OFF_HEAD, 0);
		mapped_file::write_u32(slice, off + OFF_COUNT, 0);
		slice[off + OFF_STATE] = STATE_USED;
	}

	fn lookup_bucket(&self, tag_name: u8, tag_value: &[u8; 32]) -> Option<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_tag(tag_name, tag_value) % bucket_count;
		let mut slot = start;
		loop {
			match self.state_at(slot) {
				STATE_EMPTY => return None,
				STATE_USED if self.key_at(slot) == (tag_name, *tag_value) => return Some(slot),
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return None;
			}
		}
	}

	pub fn insert(&mut self, tag_name: u8, tag_value: &[u8; 32], log_offset: u64, created_at: i64) -> Result<()> {
		let slot = self.find_or_create_bucket(tag_name, tag_value)?;
		let off = self.bucket_offset(slot);
		let head = mapped_file::read_u64(self.file.as_slice(), off + OFF_HEAD);
		let new_entry = common::alloc_entry(&mut self.file, log_offset, created_at, head)?;
		let off = self.bucket_offset(slot);
		let slice = self.file.as_mut_slice();
		mapped_file::write_u64(slice, off + OFF_HEAD, new_entry);
		let count = mapped_file::read_u32(slice, off + OFF_COUNT);
		mapped_file::write_u32(slice, off + OFF_COUNT, count + 1);
		Ok(())
	}

	pub fn iterate(
		&self,
		tag_name: u8,
		tag_value: &[u8; 32],
		since: i64,
		until: i64,
		limit: u64,
		visit: impl FnMut(u64, i64) -> bool,
	) {
		let slot = match self.lookup_bucket(tag_name, tag_value) {
			Some(slot) => slot,
			None => return,
		};
		let off = self.bucket_offset(slot);
		let head = mapped_file::read_u64(self.file.as_slice(), off + OFF_HEAD);
		common::walk_list(&self.file, head, since, until, limit, visit);
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
			path.push("idx_tag");
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
	fn exact_match_vs_differing_last_byte() {
		let dir = TempDir::new("exact_match_vs_differing_last_byte");
		let mut idx = TagIndex::open(&dir.0, 256 * 1024).unwrap();
		let mut v1 = [9u8; 32];
		let mut v2 = v1;
		v2[31] ^= 1;
		idx.insert(b'e', &v1, 10, 1000).unwrap();
		idx.insert(b'e', &v2, 20, 2000).unwrap();
		let mut seen = Vec::new();
		idx.iterate(b'e', &v1, 0, 0, 0, |off, _| {
			seen.push(off);
			true
		});
		assert_eq!(seen, vec![10]);
		v1 = v2;
		let mut seen2 = Vec::new();
		idx.iterate(b'e', &v1, 0, 0, 0, |off, _| {
			seen2.push(off);
			true
		});
		assert_eq!(seen2, vec![20]);
	}

	#[test]
	fn separate_names_separate_lists() {
		let dir = TempDir::new("separate_names_separate_lists");
		let mut idx = TagIndex::open(&dir.0, 256 * 1024).unwrap();
		let v = [3u8; 32];
		idx.insert(b'e', &v, 10, 100).unwrap();
		idx.insert(b'p', &v, 20, 200).unwrap();
		let mut seen = Vec::new();
		idx.iterate(b'e', &v, 0, 0, 0, |off, _| {
			seen.push(off);
			true
		});
		assert_eq!(seen, vec![10]);
	}
}
