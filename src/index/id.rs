// 4.C.1 Id index: exact lookup via open addressing with tombstones.
//
// Bucket (48B): id[32] log_offset:u64 state:u8 + padding.

use std::convert::TryInto;
use std::path::Path;

use crate::error::{Error, Result};
use crate::event::Id;
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

use super::common::{self, STATE_EMPTY, STATE_TOMBSTONE, STATE_USED};

const MAGIC: &[u8; 8] = b"NSTIDID\0";
const BUCKET_SIZE: usize = 48;
const OFF_ID: usize = 0;
const OFF_LOG_OFFSET: usize = 32;
const OFF_STATE: usize = 40;

pub const FILE_NAME: &str = "idx_id.dat";

pub struct IdIndex {
	file: MappedFile,
}

fn hash_id(id: &Id) -> u64 {
	u64::from_le_bytes(id[0..8].try_into().unwrap())
}

impl IdIndex {
	pub fn open(dir: &Path, default_size: u64) -> Result<IdIndex> {
		let (mut file, created) = MappedFile::open(dir, FILE_NAME, default_size)?;
		if created {
			let usable = file.len() - HEADER_SIZE as u64;
			let bucket_count = (usable / BUCKET_SIZE as u64).max(1);
			let file_len = file.len();
			common::init_header(&mut file, MAGIC, bucket_count, file_len, 0);
			file.sync()?;
		} else {
			common::validate_header(&file, MAGIC)?;
		}
		Ok(IdIndex { file })
	}

	pub fn bucket_count(&self) -> u64 {
		common::bucket_count(&self.file)
	}

	pub fn entry_count(&self) -> u64 {
		common::entry_count(&self.file)
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}

	pub fn close(self) -> Result<()> {
		self.file.close()
	}

	fn bucket_offset(&self, slot: u64) -> usize {
		HEADER_SIZE + slot as usize * BUCKET_SIZE
	}

	fn state_at(&self, slot: u64) -> u8 {
		self.file.as_slice()[self.bucket_offset(slot) + OFF_STATE]
	}

	fn id_at(&self, slot: u64) -> Id {
		let off = self.bucket_offset(slot);
		let mut id = [0u8; 32];
		id.copy_from_slice(&self.file.as_slice()[off + OFF_ID..off + OFF_ID + 32]);
		id
	}

	pub fn lookup(&self, id: &Id) -> Result<u64> {
		let bucket_count = self.bucket_count();
		let start = hash_id(id) % bucket_count;
		let mut slot = start;
		loop {
			match self.state_at(slot) {
				STATE_EMPTY => return Err(Error::NotFound),
				STATE_USED if &self.id_at(slot) == id => {
					let off = self.bucket_offset(slot);
					return Ok(mapped_file::read_u64(self.file.as_slice(), off + OFF_LOG_OFFSET));
				}
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return Err(Error::NotFound);
			}
		}
	}

	pub fn insert(&mut self, id: &Id, log_offset: u64) -> Result<()> {
		if self.lookup(id).is_ok() {
			return Err(Error::Duplicate);
		}
		let bucket_count = self.bucket_count();
		let start = hash_id(id) % bucket_count;
		let mut slot = start;
		let mut first_tombstone: Option<u64> = None;
		loop {
			match self.state_at(slot) {
				STATE_EMPTY => {
					let target = first_tombstone.unwrap_or(slot);
					self.write_bucket(target, id, log_offset, STATE_USED);
					let new_count = self.entry_count() + 1;
					common::set_entry_count(&mut self.file, new_count);
					return Ok(());
				}
				STATE_TOMBSTONE
					if first_tombstone.is_none() => {
						first_tombstone = Some(slot);
					}
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return Err(Error::Full);
			}
		}
	}

	fn write_bucket(&mut self, slot: u64, id: &Id, log_offset: u64, state: u8) {
		let off = self.bucket_offset(slot);
		let slice = self.file.as_mut_slice();
		slice[off + OFF_ID..off + OFF_ID + 32].copy_from_slice(id);
		mapped_file::write_u64(slice, off + OFF_LOG_OFFSET, log_offset);
		slice[off + OFF_STATE] = state;
	}

	pub fn remove(&mut self, id: &Id) -> Result<()> {
		let bucket_count = self.bucket_count();
		let start = hash_id(id) % bucket_count;
		let mut slot = start;
		loop {
			match self.state_at(slot) {
				STATE_EMPTY => return Err(Error::NotFound),
				STATE_USED
					if &self.id_at(slot) == id => {
						let off = self.bucket_offset(slot);
						self.file.as_mut_slice()[off + OFF_STATE] = STATE_TOMBSTONE;
						let new_count = self.entry_count().saturating_sub(1);
						common::set_entry_count(&mut self.file, new_count);
						return Ok(());
					}
				_ => {}
			}
			slot = (slot + 1) % bucket_count;
			if slot == start {
				return Err(Error::NotFound);
			}
		}
	}

	pub fn needs_rehash(&self) -> bool {
		self.entry_count() * 100 >= self.bucket_count() * 70
	}
}
