// 4.C.3 Kind index: a direct array of 65,536 slots (covering the u16 kind
// range), each the head of a newest-first linked list of pool entries.
//
// Slot (16B): head_entry_offset:u64 entry_count:u64.

use std::path::Path;

use crate::error::{Error, Result};
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

use super::common;

const MAGIC: &[u8; 8] = b"NSTIDK\0\0";
const SLOT_SIZE: usize = 16;
const OFF_HEAD: usize = 0;
const OFF_COUNT: usize = 8;
pub const KIND_SLOTS: u64 = 65536;

pub const FILE_NAME: &str = "idx_kind.dat";

pub struct KindIndex {
	file: MappedFile,
}

impl KindIndex {
	pub fn open(dir: &Path, default_size: u64) -> Result<KindIndex> {
		let slots_region = KIND_SLOTS * SLOT_SIZE as u64;
		let required = HEADER_SIZE as u64 + slots_region;
		let default_size = default_size.max(required + ENTRY_POOL_MIN);
		let (mut file, created) = MappedFile::open(dir, FILE_NAME, default_size)?;
		if created {
			let pool_start = HEADER_SIZE as u64 + slots_region;
			let pool_size = file.len() - pool_start;
			common::init_header(&mut file, MAGIC, KIND_SLOTS, pool_start, pool_size);
			file.sync()?;
		} else {
			common::validate_header(&file, MAGIC)?;
		}
		Ok(KindIndex { file })
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}

	pub fn close(self) -> Result<()> {
		self.file.close()
	}

	pub fn entry_count(&self) -> u64 {
		common::entry_count(&self.file)
	}

	fn slot_offset(&self, kind: u32) -> usize {
		HEADER_SIZE + kind as usize * SLOT_SIZE
	}

	fn check_kind(kind: u32) -> Result<()> {
		if kind > 65535 {
			return Err(Error::InvalidEvent(format!("kind {} out of u16 range", kind)));
		}
		Ok(())
	}

	pub fn insert(&mut self, kind: u32, log_offset: u64, created_at: i64) -> Result<()> {
		Self::check_kind(kind)?;
		let off = self.slot_offset(kind);
		let head = mapped_file::read_u64(self.file.as_slice(), off + OFF_HEAD);
		let new_entry = common::alloc_entry(&mut self.file, log_offset, created_at, head)?;
		let off = self.slot_offset(kind);
		let slice = self.file.as_mut_slice();
		mapped_file::write_u64(slice, off + OFF_HEAD, new_entry);
		let count = mapped_file::read_u64(slice, off + OFF_COUNT);
		mapped_file::write_u64(slice, off + OFF_COUNT, count + 1);
		Ok(())
	}

	pub fn iterate(
		&self,
		kind: u32,
		since: i64,
		until: i64,
		limit: u64,
		visit: impl FnMut(u64, i64) -> bool,
	) -> Result<()> {
		Self::check_kind(kind)?;
		let off = self.slot_offset(kind);
		let head = mapped_file::read_u64(self.file.as_slice(), off + OFF_HEAD);
		common::walk_list(&self.file, head, since, until, limit, visit);
		Ok(())
	}
}

const ENTRY_POOL_MIN: u64 = 4096;
