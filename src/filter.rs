// The filter predicate shared by the query planner (4.D) and the
// subscription matcher (4.E). Both evaluate events against a `Filter`
// with the same `matches` semantics; the planner additionally picks an
// index to narrow the search before falling back to this as a residual
// check.

use crate::event::{value_prefix32, Event};

/// A tag predicate: the event must carry a tag named `name` (single-byte
/// names only, per 4.C.5) with at least one value in `values`, each
/// reduced to the same 32-byte key the tag index stores.
#[derive(Debug, Clone)]
pub struct TagPredicate {
	pub name: u8,
	pub values: Vec<[u8; 32]>,
}

impl TagPredicate {
	pub fn new(name: u8, raw_values: Vec<Vec<u8>>) -> TagPredicate {
		TagPredicate { name, values: raw_values.iter().map(|v| value_prefix32(v)).collect() }
	}
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
	pub ids: Vec<Vec<u8>>,
	pub authors: Vec<Vec<u8>>,
	pub kinds: Vec<u32>,
	pub tags: Vec<TagPredicate>,
	pub since: i64,
	pub until: i64,
	pub limit: u64,
}

impl Filter {
	pub fn new() -> Filter {
		Filter::default()
	}

	/// True when every id in `ids` is a full 32-byte id rather than a
	/// shorter prefix — the condition 4.D's index selection rule 1 checks.
	pub fn ids_are_full_length(&self) -> bool {
		!self.ids.is_empty() && self.ids.iter().all(|id| id.len() == 32)
	}
}

fn prefix_match(prefix: &[u8], full: &[u8; 32]) -> bool {
	prefix.len() <= 32 && &full[..prefix.len()] == prefix
}

/// Evaluates the full predicate set of `filter` against `event`, exactly
/// as 4.D states: empty sets are unconstrained, every present field is a
/// conjunction, and each field's own set is a disjunction.
pub fn matches(filter: &Filter, event: &Event) -> bool {
	if !filter.ids.is_empty() && !filter.ids.iter().any(|p| prefix_match(p, &event.id)) {
		return false;
	}
	if !filter.authors.is_empty() && !filter.authors.iter().any(|p| prefix_match(p, &event.pubkey)) {
		return false;
	}
	if !filter.kinds.is_empty() && !filter.kinds.contains(&event.kind) {
		return false;
	}
	for pred in &filter.tags {
		let tag_matches = event.tags.iter().any(|tag| {
			tag.indexable_name() == Some(pred.name) && pred.values.iter().any(|v| tag.value_prefix32() == *v)
		});
		if !tag_matches {
			return false;
		}
	}
	if filter.since != 0 && event.created_at < filter.since {
		return false;
	}
	if filter.until != 0 && event.created_at > filter.until {
		return false;
	}
	true
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::event::Tag;

	fn sample_event(kind: u32, pubkey: [u8; 32], created_at: i64, tags: Vec<Tag>) -> Event {
		Event::new([1u8; 32], pubkey, [2u8; 64], kind, created_at, "hello".into(), tags)
	}

	#[test]
	fn unconstrained_filter_matches_everything() {
		let f = Filter::new();
		let e = sample_event(1, [9u8; 32], 1000, vec![]);
		assert!(matches(&f, &e));
	}

	#[test]
	fn kind_predicate() {
		let mut f = Filter::new();
		f.kinds = vec![1];
		let e = sample_event(4, [9u8; 32], 1000, vec![]);
		assert!(!matches(&f, &e));
	}

	#[test]
	fn tag_predicate_exact_vs_differing_last_byte() {
		let full_hex = "dd".repeat(32);
		let tag = Tag::new(b"e".to_vec(), vec![full_hex.clone().into_bytes()]).unwrap();
		let e = sample_event(1, [9u8; 32], 1000, vec![tag]);

		let mut f = Filter::new();
		f.tags = vec![TagPredicate::new(b'e', vec![full_hex.into_bytes()])];
		assert!(matches(&f, &e));

		let mut different = "dd".repeat(31);
		different.push_str("ee");
		f.tags = vec![TagPredicate::new(b'e', vec![different.into_bytes()])];
		assert!(!matches(&f, &e));
	}

	#[test]
	fn time_window() {
		let mut f = Filter::new();
		f.since = 2000;
		f.until = 3000;
		assert!(matches(&f, &sample_event(1, [0u8; 32], 2500, vec![])));
		assert!(!matches(&f, &sample_event(1, [0u8; 32], 1500, vec![])));
		assert!(!matches(&f, &sample_event(1, [0u8; 32], 3500, vec![])));
	}
}
