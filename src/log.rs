// 4.B Event log: append-only, 8-byte aligned, variable-length records.
//
// Record layout (spec.md 3):
//   total_length:u32  flags:u32  id:[u8;32]  created_at:i64
//   pubkey:[u8;32]    sig:[u8;64]  kind:u32  content_length:u32
//   content:[u8;content_length]
//   tags_length:u32   tags:[u8;tags_length]
//   padding:[u8;k]    (whole record 8-byte aligned)
//
// File header (64B, spec.md 3 / 6): magic "NOSTRDB\0", version, flags,
// event_count, next_write_offset, tombstone_count, file_size, reserved.

use std::path::Path;

use crate::error::{Error, Result};
use crate::event::{self, Event};
use crate::mapped_file::{self, MappedFile, HEADER_SIZE};

const MAGIC: &[u8; 8] = b"NOSTRDB\0";
const VERSION: u32 = 1;

const OFF_VERSION: usize = 8;
const OFF_FLAGS: usize = 12;
const OFF_EVENT_COUNT: usize = 16;
const OFF_NEXT_WRITE_OFFSET: usize = 24;
const OFF_TOMBSTONE_COUNT: usize = 32;
const OFF_FILE_SIZE: usize = 40;

const TOMBSTONE_BIT: u32 = 1;

// fixed portion before content: total_length, flags, id, created_at,
// pubkey, sig, kind, content_length
const RECORD_FIXED_LEN: usize = 4 + 4 + 32 + 8 + 32 + 64 + 4 + 4;

pub const FILE_NAME: &str = "events.dat";

fn align8(n: usize) -> usize {
	(n + 7) & !7
}

pub struct EventLog {
	file: MappedFile,
}

impl EventLog {
	pub fn open(dir: &Path, default_size: u64) -> Result<EventLog> {
		let (mut file, created) = MappedFile::open(dir, FILE_NAME, default_size)?;
		if created {
			let file_len = file.len();
			let slice = file.as_mut_slice();
			mapped_file::write_magic(slice, MAGIC);
			mapped_file::write_u32(slice, OFF_VERSION, VERSION);
			mapped_file::write_u32(slice, OFF_FLAGS, 0);
			mapped_file::write_u64(slice, OFF_EVENT_COUNT, 0);
			mapped_file::write_u64(slice, OFF_NEXT_WRITE_OFFSET, HEADER_SIZE as u64);
			mapped_file::write_u64(slice, OFF_TOMBSTONE_COUNT, 0);
			mapped_file::write_u64(slice, OFF_FILE_SIZE, file_len);
			file.sync()?;
		} else {
			mapped_file::check_magic(file.as_slice(), MAGIC)?;
			if mapped_file::read_u32(file.as_slice(), OFF_VERSION) != VERSION {
				return Err(Error::VersionMismatch);
			}
		}
		Ok(EventLog { file })
	}

	pub fn event_count(&self) -> u64 {
		mapped_file::read_u64(self.file.as_slice(), OFF_EVENT_COUNT)
	}

	pub fn tombstone_count(&self) -> u64 {
		mapped_file::read_u64(self.file.as_slice(), OFF_TOMBSTONE_COUNT)
	}

	pub fn next_write_offset(&self) -> u64 {
		mapped_file::read_u64(self.file.as_slice(), OFF_NEXT_WRITE_OFFSET)
	}

	pub fn sync(&self) -> Result<()> {
		self.file.sync()
	}

	pub fn close(self) -> Result<()> {
		self.file.close()
	}

	/// Appends an event, returning its log offset. Fails `Full` if the
	/// record would not fit in the mapped region.
	pub fn append(&mut self, event: &Event, content_ceiling: usize) -> Result<u64> {
		if event.content.len() > content_ceiling {
			return Err(Error::InvalidEvent(format!(
				"content length {} exceeds ceiling {}",
				event.content.len(),
				content_ceiling
			)));
		}
		let tags_buf = event::serialize_tags(&event.tags);
		let content_bytes = event.content.as_bytes();
		let unpadded = RECORD_FIXED_LEN + content_bytes.len() + 4 + tags_buf.len();
		let total_length = align8(unpadded);

		let offset = self.next_write_offset();
		let file_size = self.file.len();
		if offset + total_length as u64 > file_size {
			return Err(Error::Full);
		}

		let slice = self.file.as_mut_slice();
		let mut w = offset as usize;
		mapped_file::write_u32(slice, w, total_length as u32);
		w += 4;
		mapped_file::write_u32(slice, w, 0); // flags
		w += 4;
		slice[w..w + 32].copy_from_slice(&event.id);
		w += 32;
		mapped_file::write_i64(slice, w, event.created_at);
		w += 8;
		slice[w..w + 32].copy_from_slice(&event.pubkey);
		w += 32;
		slice[w..w + 64].copy_from_slice(&event.sig);
		w += 64;
		mapped_file::write_u32(slice, w, event.kind);
		w += 4;
		mapped_file::write_u32(slice, w, content_bytes.len() as u32);
		w += 4;
		slice[w..w + content_bytes.len()].copy_from_slice(content_bytes);
		w += content_bytes.len();
		mapped_file::write_u32(slice, w, tags_buf.len() as u32);
		w += 4;
		slice[w..w + tags_buf.len()].copy_from_slice(&tags_buf);
		w += tags_buf.len();
		for b in &mut slice[w..offset as usize + total_length] {
			*b = 0;
		}

		let new_next = offset + total_length as u64;
		let new_count = self.event_count() + 1;
		mapped_file::write_u64(self.file.as_mut_slice(), OFF_EVENT_COUNT, new_count);
		// next_write_offset is updated last: readers on the same thread see
		// either the pre-append state or the fully-linked post-append one.
		mapped_file::write_u64(self.file.as_mut_slice(), OFF_NEXT_WRITE_OFFSET, new_next);
		log::trace!(target: "nostr-store", "Appended event {} at offset {}", event.id_hex(), offset);
		Ok(offset)
	}

	/// Reads the record at `log_offset`. Tombstoned records read as
	/// `NotFound`.
	pub fn read(&self, log_offset: u64) -> Result<Event> {
		let next_write_offset = self.next_write_offset();
		if log_offset < HEADER_SIZE as u64 || log_offset >= next_write_offset {
			return Err(Error::NotFound);
		}
		let slice = self.file.as_slice();
		let mut r = log_offset as usize;
		let total_length = mapped_file::read_u32(slice, r) as usize;
		r += 4;
		let flags = mapped_file::read_u32(slice, r);
		r += 4;
		if flags & TOMBSTONE_BIT != 0 {
			return Err(Error::NotFound);
		}
		let mut id = [0u8; 32];
		id.copy_from_slice(&slice[r..r + 32]);
		r += 32;
		let created_at = mapped_file::read_i64(slice, r);
		r += 8;
		let mut pubkey = [0u8; 32];
		pubkey.copy_from_slice(&slice[r..r + 32]);
		r += 32;
		let mut sig = [0u8; 64];
		sig.copy_from_slice(&slice[r..r + 64]);
		r += 64;
		let kind = mapped_file::read_u32(slice, r);
		r += 4;
		let content_length = mapped_file::read_u32(slice, r) as usize;
		r += 4;
		if r + content_length > slice.len() {
			return Err(Error::IndexCorrupt("content length overruns file".into()));
		}
		let content = String::from_utf8_lossy(&slice[r..r + content_length]).into_owned();
		r += content_length;
		let tags_length = mapped_file::read_u32(slice, r) as usize;
		r += 4;
		if r + tags_length > slice.len() {
			return Err(Error::IndexCorrupt("tags length overruns file".into()));
		}
		let tags = event::deserialize_tags(&slice[r..r + tags_length])?;
		debug_assert!(r + tags_length <= log_offset as usize + total_length);

		Ok(Event { id, pubkey, sig, kind, created_at, content, tags })
	}

	/// True if the record at `log_offset` is tombstoned; used by index
	/// iterators to recheck liveness per invariant 2.
	pub fn is_tombstoned(&self, log_offset: u64) -> bool {
		let slice = self.file.as_slice();
		if log_offset < HEADER_SIZE as u64 || (log_offset as usize) + 8 > slice.len() {
			return true;
		}
		let flags = mapped_file::read_u32(slice, log_offset as usize + 4);
		flags & TOMBSTONE_BIT != 0
	}

	/// Sets the tombstone bit. Idempotent.
	pub fn tombstone(&mut self, log_offset: u64) -> Result<()> {
		let next_write_offset = self.next_write_offset();
		if log_offset < HEADER_SIZE as u64 || log_offset >= next_write_offset {
			return Err(Error::NotFound);
		}
		let slice = self.file.as_mut_slice();
		let flags_off = log_offset as usize + 4;
		let flags = mapped_file::read_u32(slice, flags_off);
		if flags & TOMBSTONE_BIT != 0 {
			return Ok(()); // already tombstoned, no-op
		}
		mapped_file::write_u32(slice, flags_off, flags | TOMBSTONE_BIT);
		let new_tombstones = self.tombstone_count() + 1;
		mapped_file::write_u64(self.file.as_mut_slice(), OFF_TOMBSTONE_COUNT, new_tombstones);
		Ok(())
	}
}
