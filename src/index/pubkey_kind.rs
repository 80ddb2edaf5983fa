// 4.C.4 Pubkey+Kind index: composite-keyed, open-addressed buckets of
// newest-first linked lists.
//
// Bucket (56B): pubkey[32] kind:u32 head:u64 count:u32 state:u8 + padding.
// Hash: first-8-bytes of pubkey XOR-mixed with kind * golden-ratio constant.

use std::convert::TryInto;
use std::path::Path;

use crate::error::Result;
use crate::event::PubKey;
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

use super::common::{self, STATE_EMPTY, STATE_TOMBSTONE, STATE_USED};

const MAGIC: &[u8; 8] = b"NSTIDPKK";
const BUCKET_SIZE: usize = 56;
const OFF_PUBKEY: usize = 0;
const OFF_KIND: usize = 32;
const OFF_HEAD: usize = 36;
const OFF_COUNT: usize = 44;
const OFF_STATE: usize = 48;

const GOLDEN_RATIO: u64 = 0x9E3779B97F4A7C15;

pub const FILE_NAME: &str = "idx_pubkey_kind.dat";

pub struct PubkeyKindIndex {
	file: MappedFile,
}

fn hash_pubkey_kind(pubkey: &PubKey, kind: u32) -> u64 {
	let pk = u64::from_le_bytes(pubkey[0..8].try_into().unwrap());
	pk ^ (kind as u64).wrapping_mul(GOLDEN_RATIO)
}

impl PubkeyKindIndex {
	pub fn open(dir: &Path, default_size: u64) -> Result<PubkeyKindIndex> {
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
		Ok(PubkeyKindIndex { file })
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

	fn key_at(&self, slot: u64) -> (PubKey, u32) {
		let off = self.bucket_offset(slot);
		let slice = self.file.as_slice();
		let mut pubkey = [0u8; 32];
		pubkey.copy_from_slice(&slice[off + OFF_PUBKEY..off + OFF_PUBKEY + 32]);
		let kind = mapped_file::read_u32(slice, off + OFF_KIND);
		(pubkey, kind)
	}

	fn find_or_create_bucket(&mut self, pubkey: &PubKey, kind: u32) -> Result<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_pubkey_kind(pubkey, kind) % bucket_count;
		let mut slot = start;
		let mut first_free: Option<u64> = None;
		loop {
			match self.state_at(slot) {
				STATE_USED
					if self.key_at(slot) == (*pubkey, kind) => {
						return Ok(slot);
					}
				STATE_EMPTY => {
					let target = first_free.unwrap_or(slot);
					self.init_bucket(target, pubkey, kind);
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

	fn init_bucket(&mut self, slot: u64, pubkey: &PubKey, kind: u32) {
		let off = self.bucket_offset(slot);
		let slice = self.file.as_mut_slice();
		slice[off + OFF_PUBKEY..off + OFF_PUBKEY + 32].copy_from_slice(pubkey);
		mapped_file::write_u32(slice, off + OFF_KIND, kind);
		mapped_file::write_u64(slice, off + OFF_HEAD, 0);
		mapped_file::write_u32(slice, off + OFF_COUNT, 0);
		slice[off + OFF_STATE] = STATE_USED;
	}

	fn lookup_bucket(&self, pubkey: &PubKey, kind: u32) -> Option<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_pubkey_kind(pubkey, kind) % bucket_count;
		let mut slot = start;
		loop {
			match self.state_at(slot) {
				STATE_EMPTY => return None,
				STATE_USED if self.key_at(slot) == (*pubkey, kind) => return Some(slot),
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return None;
			}
		}
	}

	pub fn insert(&mut self, pubkey: &PubKey, kind: u32, log_offset: u64, created_at: i64) -> Result<()> {
		let slot = self.find_or_create_bucket(pubkey, kind)?;
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
		pubkey: &PubKey,
		kind: u32,
		since: i64,
		until: i64,
		limit: u64,
		visit: impl FnMut(u64, i64) -> bool,
	) {
		let slot = match self.lookup_bucket(pubkey, kind) {
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
			path.push("idx_pubkey_kind");
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
	fn distinguishes_same_pubkey_different_kind() {
		let dir = TempDir::new("distinguishes_same_pubkey_different_kind");
		let mut idx = PubkeyKindIndex::open(&dir.0, 256 * 1024).unwrap();
		let pk = [5u8; 32];
		idx.insert(&pk, 1, 10, 1000).unwrap();
		idx.insert(&pk, 4, 20, 2000).unwrap();
		let mut kind1 = Vec::new();
		idx.iterate(&pk, 1, 0, 0, 0, |off, _| {
			kind1.push(off);
			true
		});
		assert_eq!(kind1, vec![10]);
	}

	#[test]
	fn newest_first() {
		// Walk order follows insertion (prepend) order, not created_at.
		let dir = TempDir::new("newest_first");
		let mut idx = PubkeyKindIndex::open(&dir.0, 256 * 1024).unwrap();
		let pk = [6u8; 32];
		idx.insert(&pk, 1, 10, 1000).unwrap();
		idx.insert(&pk, 1, 20, 3000).unwrap();
		idx.insert(&pk, 1, 30, 2000).unwrap();
		let mut seen = Vec::new();
		idx.iterate(&pk, 1, 0, 0, 0, |off, _| {
			seen.push(off);
			true
		});
		assert_eq!(seen, vec![30, 20, 10]);
	}
}
