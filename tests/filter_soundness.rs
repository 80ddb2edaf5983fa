// spec.md 8's filter soundness-and-completeness property: for every filter
// F and event E in the store, `query(F)` contains E iff `matches(F, E)`.
// Verified here by a randomised generator comparing the planner's result
// (which picks one of six indexes per 4.D) against a linear scan over
// every appended event, across a mix of the id/author/kind/tag/time
// predicates and every index-selection branch.

use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nostr_store::event::Tag;
use nostr_store::{open_store, Event, Filter, StoreOptions, TagPredicate};

struct TempDir(PathBuf);

impl TempDir {
	fn new(name: &'static str) -> TempDir {
		env_logger::try_init().ok();
		let mut path = std::env::temp_dir();
		path.push("nostr-store-test");
		path.push("filter_soundness");
		path.push(name);
		if path.exists() {
			fs::remove_dir_all(&path).unwrap();
		}
		TempDir(path)
	}
}

impl Drop for TempDir {
	fn drop(&mut self) {
		if self.0.exists() {
			fs::remove_dir_all(&self.0).unwrap();
		}
	}
}

const PUBKEY_POOL: usize = 5;
const KIND_POOL: u32 = 6;
const TAG_VALUE_POOL: usize = 4;

fn random_event(rng: &mut StdRng, n: u32) -> Event {
	let mut id = [0u8; 32];
	id[0..4].copy_from_slice(&n.to_le_bytes());
	rng.fill(&mut id[4..]);

	let author = rng.gen_range(0..PUBKEY_POOL) as u8;
	let mut pubkey = [0u8; 32];
	pubkey[0] = author;

	let kind = rng.gen_range(0..KIND_POOL);
	let created_at = rng.gen_range(1_600_000_000..1_700_000_000);

	let mut tags = Vec::new();
	if rng.gen_bool(0.6) {
		let value = rng.gen_range(0..TAG_VALUE_POOL) as u8;
		tags.push(Tag::new(b"e".to_vec(), vec![vec![value; 32]]).unwrap());
	}
	if rng.gen_bool(0.3) {
		tags.push(Tag::new(b"client".to_vec(), vec![b"randomised-test".to_vec()]).unwrap());
	}

	Event::new(id, pubkey, [0u8; 64], kind, created_at, "x".into(), tags)
}

fn random_filter(rng: &mut StdRng, events: &[Event]) -> Filter {
	let mut f = Filter::new();

	match rng.gen_range(0..6) {
		0 => {
			// id-index branch: every id full length
			let count = rng.gen_range(1..=3);
			for _ in 0..count {
				let e = &events[rng.gen_range(0..events.len())];
				f.ids.push(e.id.to_vec());
			}
		}
		1 => {
			// tag-index branch
			let value = rng.gen_range(0..TAG_VALUE_POOL) as u8;
			f.tags.push(TagPredicate::new(b'e', vec![vec![value; 32]]));
		}
		2 => {
			// pubkey+kind branch: small cardinality on both sides
			let author = rng.gen_range(0..PUBKEY_POOL) as u8;
			let mut pubkey = [0u8; 32];
			pubkey[0] = author;
			f.authors.push(pubkey.to_vec());
			f.kinds.push(rng.gen_range(0..KIND_POOL));
		}
		3 => {
			let author = rng.gen_range(0..PUBKEY_POOL) as u8;
			let mut pubkey = [0u8; 32];
			pubkey[0] = author;
			f.authors.push(pubkey.to_vec());
		}
		4 => {
			f.kinds.push(rng.gen_range(0..KIND_POOL));
		}
		_ => {
			// timeline branch: only the time window constrains
		}
	}

	if rng.gen_bool(0.5) {
		f.since = rng.gen_range(1_600_000_000..1_650_000_000);
	}
	if rng.gen_bool(0.5) {
		f.until = rng.gen_range(1_650_000_000..1_700_000_000);
	}

	f
}

#[test]
fn query_matches_linear_scan_across_index_selection_branches() {
	let dir = TempDir::new("query_matches_linear_scan");
	let mut store = open_store(&StoreOptions::new(dir.0.clone())).unwrap();
	let mut rng = StdRng::seed_from_u64(0xC0FFEE);

	let mut events = Vec::new();
	for n in 0..200u32 {
		let event = random_event(&mut rng, n);
		store.append_event(&event).unwrap();
		events.push(event);
	}

	for trial in 0..300 {
		let filter = random_filter(&mut rng, &events);

		let expected: std::collections::HashSet<[u8; 32]> =
			events.iter().filter(|e| nostr_store::filter::matches(&filter, e)).map(|e| e.id).collect();

		let actual: std::collections::HashSet<[u8; 32]> = store.query(&filter).unwrap().iter().map(|e| e.id).collect();

		assert_eq!(actual, expected, "trial {} mismatched for filter {:?}", trial, filter);
	}
}
