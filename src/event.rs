// The shared data model: events, tags, and the tag wire format the log
// record embeds. Grounded on `examples/original_source/src/nostr/db/db_tags.c`
// for the serialised tag layout (tag_count:u16, then per tag
// value_count:u8 name_len:u8 name, then per value value_len:u16 value).

use std::convert::TryInto;

use crate::error::{Error, Result};

pub const ID_LEN: usize = 32;
pub const PUBKEY_LEN: usize = 32;
pub const SIG_LEN: usize = 64;
pub const MAX_TAG_NAME_LEN: usize = 64;
pub const MAX_TAG_VALUES: usize = 16;
pub const MAX_TAG_VALUE_LEN: usize = 512;

pub type Id = [u8; ID_LEN];
pub type PubKey = [u8; PUBKEY_LEN];
pub type Sig = [u8; SIG_LEN];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
	pub name: Vec<u8>,
	pub values: Vec<Vec<u8>>,
}

impl Tag {
	pub fn new(name: Vec<u8>, values: Vec<Vec<u8>>) -> Result<Tag> {
		if name.is_empty() || name.len() > MAX_TAG_NAME_LEN {
			return Err(Error::InvalidEvent(format!("tag name length {} out of range", name.len())));
		}
		if values.is_empty() || values.len() > MAX_TAG_VALUES {
			return Err(Error::InvalidEvent(format!("tag value count {} out of range", values.len())));
		}
		for v in &values {
			if v.len() > MAX_TAG_VALUE_LEN {
				return Err(Error::InvalidEvent(format!("tag value length {} exceeds {}", v.len(), MAX_TAG_VALUE_LEN)));
			}
		}
		Ok(Tag { name, values })
	}

	/// Single-byte tag names (`#e`, `#p`, `#t`, ...) are the only ones the
	/// tag index covers, per spec.md 4.C.5.
	pub fn indexable_name(&self) -> Option<u8> {
		if self.name.len() == 1 {
			Some(self.name[0])
		} else {
			None
		}
	}

	/// First 32 bytes of the tag's first value: full decoded binary for
	/// 64-hex 'e'/'p' values, a byte prefix otherwise.
	pub fn value_prefix32(&self) -> [u8; 32] {
		match self.values.first() {
			Some(v) => value_prefix32(v),
			None => [0u8; 32],
		}
	}
}

/// Reduces a tag value to the 32-byte key the tag index and filter matching
/// both compare against: full decoded binary for a 64-hex value, a byte
/// prefix otherwise.
pub fn value_prefix32(value: &[u8]) -> [u8; 32] {
	if let Some(decoded) = try_decode_hex_fixed::<32>(value) {
		return decoded;
	}
	let mut out = [0u8; 32];
	let len = value.len().min(32);
	out[..len].copy_from_slice(&value[..len]);
	out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
	pub id: Id,
	pub pubkey: PubKey,
	pub sig: Sig,
	pub kind: u32,
	pub created_at: i64,
	pub content: String,
	pub tags: Vec<Tag>,
}

impl Event {
	/// Constructs an event from raw fields, as a host that has already
	/// decoded wire hex would call it.
	pub fn new(
		id: Id,
		pubkey: PubKey,
		sig: Sig,
		kind: u32,
		created_at: i64,
		content: String,
		tags: Vec<Tag>,
	) -> Event {
		Event { id, pubkey, sig, kind, created_at, content, tags }
	}

	/// Constructs an event from hex-encoded id/pubkey/sig, the form a
	/// freshly-parsed client message arrives in. Fails `InvalidEvent` if
	/// any of the three fail to hex-decode to the expected length.
	pub fn from_hex_fields(
		id_hex: &str,
		pubkey_hex: &str,
		sig_hex: &str,
		kind: u32,
		created_at: i64,
		content: String,
		tags: Vec<Tag>,
	) -> Result<Event> {
		let id = decode_hex_fixed::<ID_LEN>(id_hex, "id")?;
		let pubkey = decode_hex_fixed::<PUBKEY_LEN>(pubkey_hex, "pubkey")?;
		let sig = decode_hex_fixed::<SIG_LEN>(sig_hex, "sig")?;
		Ok(Event::new(id, pubkey, sig, kind, created_at, content, tags))
	}

	pub fn id_hex(&self) -> String {
		hex::encode(self.id)
	}

	pub fn pubkey_hex(&self) -> String {
		hex::encode(self.pubkey)
	}
}

fn decode_hex_fixed<const N: usize>(s: &str, field: &str) -> Result<[u8; N]> {
	try_decode_hex_fixed::<N>(s.as_bytes())
		.ok_or_else(|| Error::InvalidEvent(format!("{} is not valid {}-byte hex", field, N)))
}

fn try_decode_hex_fixed<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
	if bytes.len() != N * 2 {
		return None;
	}
	let decoded = hex::decode(bytes).ok()?;
	decoded.try_into().ok()
}

/// Serialises the tag list into the on-disk tag blob.
pub fn serialize_tags(tags: &[Tag]) -> Vec<u8> {
	let mut buf = Vec::new();
	buf.extend_from_slice(&(tags.len() as u16).to_le_bytes());
	for tag in tags {
		buf.push(tag.values.len() as u8);
		buf.push(tag.name.len() as u8);
		buf.extend_from_slice(&tag.name);
		for value in &tag.values {
			buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
			buf.extend_from_slice(value);
		}
	}
	buf
}

/// Deserialises a tag blob written by `serialize_tags`.
pub fn deserialize_tags(buf: &[u8]) -> Result<Vec<Tag>> {
	if buf.len() < 2 {
		return Err(Error::IndexCorrupt("tag blob too short".into()));
	}
	let mut pos = 0usize;
	let tag_count = u16::from_le_bytes(buf[0..2].try_into().unwrap()) as usize;
	pos += 2;
	let mut tags = Vec::with_capacity(tag_count);
	for _ in 0..tag_count {
		if pos + 2 > buf.len() {
			return Err(Error::IndexCorrupt("truncated tag header".into()));
		}
		let value_count = buf[pos] as usize;
		let name_len = buf[pos + 1] as usize;
		pos += 2;
		if pos + name_len > buf.len() {
			return Err(Error::IndexCorrupt("truncated tag name".into()));
		}
		let name = buf[pos..pos + name_len].to_vec();
		pos += name_len;
		let mut values = Vec::with_capacity(value_count);
		for _ in 0..value_count {
			if pos + 2 > buf.len() {
				return Err(Error::IndexCorrupt("truncated value length".into()));
			}
			let value_len = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
			pos += 2;
			if pos + value_len > buf.len() {
				return Err(Error::IndexCorrupt("truncated value".into()));
			}
			values.push(buf[pos..pos + value_len].to_vec());
			pos += value_len;
		}
		tags.push(Tag { name, values });
	}
	Ok(tags)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn tag_round_trip() {
		let tags = vec![
			Tag::new(b"e".to_vec(), vec![b"deadbeef".to_vec()]).unwrap(),
			Tag::new(b"client".to_vec(), vec![b"hello".to_vec(), b"world".to_vec()]).unwrap(),
		];
		let buf = serialize_tags(&tags);
		let decoded = deserialize_tags(&buf).unwrap();
		assert_eq!(tags, decoded);
	}

	#[test]
	fn empty_tags_round_trip() {
		let buf = serialize_tags(&[]);
		assert_eq!(deserialize_tags(&buf).unwrap(), vec![]);
	}

	#[test]
	fn rejects_bad_hex() {
		let err = Event::from_hex_fields("zz", "aa".repeat(32).as_str(), "bb".repeat(64).as_str(), 1, 0, String::new(), vec![]);
		assert!(err.is_err());
	}

	#[test]
	fn indexable_name_single_byte_only() {
		let e = Tag::new(b"e".to_vec(), vec![vec![0u8; 4]]).unwrap();
		assert_eq!(e.indexable_name(), Some(b'e'));
		let client = Tag::new(b"client".to_vec(), vec![vec![0u8; 4]]).unwrap();
		assert_eq!(client.indexable_name(), None);
	}

	#[test]
	fn value_prefix_decodes_hex_for_full_length() {
		let hex64 = "dd".repeat(32);
		let tag = Tag::new(b"e".to_vec(), vec![hex64.clone().into_bytes()]).unwrap();
		assert_eq!(tag.value_prefix32(), [0xddu8; 32]);
	}
}
