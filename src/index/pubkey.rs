// 4.C.2 Pubkey index: open-addressed buckets, each the head of a
// newest-first linked list of pool entries.
//
// Bucket (48B): pubkey[32] head_entry_offset:u64 entry_count:u32 state:u8
// + padding.

use std::convert::TryInto;
use std::path::Path;

use crate::error::Result;
use crate::event::PubKey;
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

use super::common::{self, STATE_EMPTY, STATE_TOMBSTONE, STATE_USED};

const MAGIC: &[u8; 8] = b"NSTIDPK\0";
const BUCKET_SIZE: usize = 48;
const OFF_KEY: usize = 0;
const OFF_HEAD: usize = 32;
const OFF_COUNT: usize = 40;
const OFF_STATE: usize = 44;

pub const FILE_NAME: &str = "idx_pubkey.dat";

pub struct PubkeyIndex {
	file: MappedFile,
}

fn hash_pubkey(pubkey: &PubKey) -> u64 {
	u64::from_le_bytes(pubkey[0..8].try_into().unwrap())
}

impl PubkeyIndex {
	pub fn open(dir: &Path, default_size: u64) -> Result<PubkeyIndex> {
		let (mut file, created) = MappedFile::open(dir, FILE_NAME, default_size)?;
		if created {
			let usable = file.len() - HEADER_SIZE as u64;
			// Half the region for buckets (open-addressed, 70% load target),
			// the rest for the bump-allocated entry pool (spec.md 9).
			let bucket_region = usable / 2;
			let bucket_count = (bucket_region / BUCKET_SIZE as u64).max(1);
			let pool_start = HEADER_SIZE as u64 + bucket_count * BUCKET_SIZE as u64;
			let pool_size = file.len() - pool_start;
			common::init_header(&mut file, MAGIC, bucket_count, pool_start, pool_size);
			file.sync()?;
		} else {
			common::validate_header(&file, MAGIC)?;
		}
		Ok(PubkeyIndex { file })
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

	fn key_at(&self, slot: u64) -> PubKey {
		let off = self.bucket_offset(slot);
		let mut key = [0u8; 32];
		key.copy_from_slice(&self.file.as_slice()[off + OFF_KEY..off + OFF_KEY + 32]);
		key
	}

	/// Finds the bucket slot for `pubkey`, creating it (state USED, empty
	/// list) from the first empty/tombstone slot encountered if absent.
	fn find_or_create_bucket(&mut self, pubkey: &PubKey) -> Result<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_pubkey(pubkey) % bucket_count;
		let mut slot = start;
		let mut first_free: Option<u64> = None;
		loop {
			match self.state_at(slot) {
				STATE_USED
					if self.key_at(slot) == *pubkey => {
						return Ok(slot);
					}
				STATE_EMPTY => {
					let target = first_free.unwrap_or(slot);
					self.init_bucket(target, pubkey);
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

	fn init_bucket(&mut self, slot: u64, pubkey: &PubKey) {
		let off = self.bucket_offset(slot);
		let slice = self.file.as_mut_slice();
		slice[off + OFF_KEY..off + OFF_KEY + 32].copy_from_slice(pubkey);
		mapped_file::write_u64(slice, off + OFF_HEAD, 0);
		mapped_file::write_u32(slice, off + OFF_COUNT, 0);
		slice[off + OFF_STATE] = STATE_USED;
	}

	fn lookup_bucket(&self, pubkey: &PubKey) -> Option<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_pubkey(pubkey) % bucket_count;
		let mut slot = start;
		loop {
			match self.state_at(slot) {
				STATE_EMPTY => return None,
				STATE_USED if self.key_at(slot) == *pubkey => return Some(slot),
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return None;
			}
		}
	}

	pub fn insert(&mut self, pubkey: &PubKey, log_offset: u64, created_at: i64) -> Result<()> {
		let slot = self.find_or_create_bucket(pubkey)?;
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
		since: i64,
		until: i64,
		limit: u64,
		visit: impl FnMut(u64, i64) -> bool,
	) {
		let slot = match self.lookup_bucket(pubkey) {
			Some(slot) => slot,
			None => return,
		};
		let off = self.bucket_offset(slot);
		let head = mapped_file::read_u64(self.file.as_slice(), off + OFF_HEAD);
		common::walk_list(&self.file, head, since, until, limit, visit);
	}
}
