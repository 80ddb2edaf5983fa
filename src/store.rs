// Ties every component together into the host-facing API surface of
// spec.md 6: `open_store`/`close_store`/`append_event`/`read_event`/
// `delete_event`/`query`/`stats`. This is the module a transport/parser
// host actually calls.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::event_log::EventLog;
use crate::filter::{self, Filter};
use crate::index::{id, kind, pubkey, pubkey_kind, tag, timeline};
use crate::options::StoreOptions;
use crate::query::{self, Plan};

/// Counters exposed to a host's own metrics/logging layer. Expands on
/// spec.md 6, which names `Stats` without specifying its fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
	pub event_count: u64,
	pub tombstone_count: u64,
	pub id_entry_count: u64,
	pub id_bucket_count: u64,
	pub pubkey_entry_count: u64,
	pub pubkey_bucket_count: u64,
	pub kind_entry_count: u64,
	pub pubkey_kind_entry_count: u64,
	pub pubkey_kind_bucket_count: u64,
	pub tag_entry_count: u64,
	pub tag_bucket_count: u64,
	pub timeline_len: u64,
}

pub struct Store {
	log: EventLog,
	id_index: id::IdIndex,
	pubkey_index: pubkey::PubkeyIndex,
	kind_index: kind::KindIndex,
	pubkey_kind_index: pubkey_kind::PubkeyKindIndex,
	tag_index: tag::TagIndex,
	timeline_index: timeline::TimelineIndex,
	content_ceiling: usize,
}

/// Opens (creating if absent) all seven data files in `options.path`.
pub fn open_store(options: &StoreOptions) -> Result<Store> {
	fs::create_dir_all(&options.path)?;
	let dir: &Path = &options.path;

	let log = EventLog::open(dir, options.event_log_size)?;
	let id_index = id::IdIndex::open(dir, options.index_file_size)?;
	let pubkey_index = pubkey::PubkeyIndex::open(dir, options.index_file_size)?;
	let kind_index = kind::KindIndex::open(dir, options.index_file_size)?;
	let pubkey_kind_index = pubkey_kind::PubkeyKindIndex::open(dir, options.index_file_size)?;
	let tag_index = tag::TagIndex::open(dir, options.index_file_size)?;
	let timeline_index = timeline::TimelineIndex::open(dir, options.index_file_size)?;

	log::debug!(target: "nostr-store", "Opened store at {}", dir.display());
	Ok(Store {
		log,
		id_index,
		pubkey_index,
		kind_index,
		pubkey_kind_index,
		tag_index,
		timeline_index,
		content_ceiling: options.content_ceiling,
	})
}

/// Flushes and unmaps every file, in reverse order of `open_store`.
pub fn close_store(store: Store) -> Result<()> {
	store.timeline_index.close()?;
	store.tag_index.close()?;
	store.pubkey_kind_index.close()?;
	store.kind_index.close()?;
	store.pubkey_index.close()?;
	store.id_index.close()?;
	store.log.close()?;
	Ok(())
}

impl Store {
	/// Appends `event` to the log, then registers it in every applicable
	/// index. Per spec.md 5, the append→index-update sequence is strict;
	/// the broadcast step is the host's responsibility (`Store` does not
	/// own a `SubscriptionRegistry`).
	pub fn append_event(&mut self, event: &Event) -> Result<u64> {
		if self.id_index.lookup(&event.id).is_ok() {
			return Err(Error::Duplicate);
		}
		let offset = self.log.append(event, self.content_ceiling)?;
		self.id_index.insert(&event.id, offset)?;
		self.pubkey_index.insert(&event.pubkey, offset, event.created_at)?;
		self.kind_index.insert(event.kind, offset, event.created_at)?;
		self.pubkey_kind_index.insert(&event.pubkey, event.kind, offset, event.created_at)?;
		for t in &event.tags {
			if let Some(name) = t.indexable_name() {
				let value = t.value_prefix32();
				self.tag_index.insert(name, &value, offset, event.created_at)?;
			}
		}
		self.timeline_index.insert(event.created_at, offset)?;
		log::trace!(target: "nostr-store", "Indexed event {} at offset {}", event.id_hex(), offset);
		Ok(offset)
	}

	pub fn read_event(&self, log_offset: u64) -> Result<Event> {
		self.log.read(log_offset)
	}

	pub fn delete_event(&mut self, id: &crate::event::Id) -> Result<()> {
		let offset = self.id_index.lookup(id)?;
		self.log.tombstone(offset)?;
		self.id_index.remove(id)?;
		Ok(())
	}

	/// Flushes every file's dirty pages. Per spec.md 5's crash model
	/// choice (b), the store is durable only at `sync` boundaries; hosts
	/// that need durability must call this after every append.
	pub fn sync(&self) -> Result<()> {
		self.log.sync()?;
		self.id_index.sync()?;
		self.pubkey_index.sync()?;
		self.kind_index.sync()?;
		self.pubkey_kind_index.sync()?;
		self.tag_index.sync()?;
		self.timeline_index.sync()?;
		Ok(())
	}

	pub fn stats(&self) -> Stats {
		Stats {
			event_count: self.log.event_count(),
			tombstone_count: self.log.tombstone_count(),
			id_entry_count: self.id_index.entry_count(),
			id_bucket_count: self.id_index.bucket_count(),
			pubkey_entry_count: self.pubkey_index.entry_count(),
			pubkey_bucket_count: self.pubkey_index.bucket_count(),
			kind_entry_count: self.kind_index.entry_count(),
			pubkey_kind_entry_count: self.pubkey_kind_index.entry_count(),
			pubkey_kind_bucket_count: self.pubkey_kind_index.bucket_count(),
			tag_entry_count: self.tag_index.entry_count(),
			tag_bucket_count: self.tag_index.bucket_count(),
			timeline_len: self.timeline_index.count(),
		}
	}

	/// Runs a single filter: selects an index per 4.D, walks it
	/// newest-first, and applies every predicate not already covered by
	/// the chosen key as a residual in-memory check. Tombstoned records
	/// never match (the log read re-checks liveness, per invariant 2).
	pub fn query(&self, filter: &Filter) -> Result<Vec<Event>> {
		let mut seen = HashSet::new();
		let mut out = Vec::new();
		self.query_into(filter, &mut seen, &mut out);
		Ok(out)
	}

	/// Runs a set of filters as a single REQ response: results are the
	/// union of each filter's results, deduplicated by log_offset across
	/// the whole set (4.D). `limit` still applies per filter.
	pub fn query_many(&self, filters: &[Filter]) -> Result<Vec<Event>> {
		let mut seen = HashSet::new();
		let mut out = Vec::new();
		for filter in filters {
			self.query_into(filter, &mut seen, &mut out);
		}
		Ok(out)
	}

	fn query_into(&self, filter: &Filter, seen: &mut HashSet<u64>, out: &mut Vec<Event>) {
		let mut collected = 0u64;
		let mut emit = |offset: u64| -> bool {
			if !seen.insert(offset) {
				return true;
			}
			let event = match self.log.read(offset) {
				Ok(event) => event,
				Err(_) => return true, // tombstoned or racing delete; skip
			};
			if !filter::matches(filter, &event) {
				return true;
			}
			out.push(event);
			collected += 1;
			filter.limit == 0 || collected < filter.limit
		};

		match query::choose_plan(filter) {
			Plan::ById => {
				for id in &filter.ids {
					if id.len() != 32 {
						continue;
					}
					let mut key = [0u8; 32];
					key.copy_from_slice(id);
					if let Ok(offset) = self.id_index.lookup(&key) {
						if !emit(offset) {
							break;
						}
					}
				}
			}
			Plan::ByTag => {
				let pred = &filter.tags[0];
				'outer: for value in &pred.values {
					let mut keep_going = true;
					self.tag_index.iterate(pred.name, value, filter.since, filter.until, 0, |offset, _| {
						keep_going = emit(offset);
						keep_going
					});
					if !keep_going {
						break 'outer;
					}
				}
			}
			Plan::ByPubkeyKind => {
				'outer: for author in &filter.authors {
					let mut key = [0u8; 32];
					key.copy_from_slice(author);
					for kind in &filter.kinds {
						let mut keep_going = true;
						self.pubkey_kind_index.iterate(&key, *kind, filter.since, filter.until, 0, |offset, _| {
							keep_going = emit(offset);
							keep_going
						});
						if !keep_going {
							break 'outer;
						}
					}
				}
			}
			Plan::ByPubkey => {
				for author in &filter.authors {
					let mut key = [0u8; 32];
					key.copy_from_slice(author);
					let mut keep_going = true;
					self.pubkey_index.iterate(&key, filter.since, filter.until, 0, |offset, _| {
						keep_going = emit(offset);
						keep_going
					});
					if !keep_going {
						break;
					}
				}
			}
			Plan::ByKind => {
				for kind in &filter.kinds {
					let mut keep_going = true;
					// Kind validity is enforced elsewhere; an out-of-range
					// kind in a filter simply never matches anything.
					let _ = self.kind_index.iterate(*kind, filter.since, filter.until, 0, |offset, _| {
						keep_going = emit(offset);
						keep_going
					});
					if !keep_going {
						break;
					}
				}
			}
			Plan::ByTimeline => {
				self.timeline_index.iterate(filter.since, filter.until, 0, |offset, _| emit(offset));
			}
		}
	}
}
