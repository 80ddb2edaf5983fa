// 4.D Query planner: pure index-selection logic over a `Filter`. The
// executor that actually walks indexes and the log lives on `Store`,
// since it needs access to every index file; this module only decides
// which access path to take.

use crate::filter::Filter;

/// Cartesian product threshold for the pubkey+kind plan (4.D rule 3).
const CARTESIAN_THRESHOLD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
	ById,
	ByTag,
	ByPubkeyKind,
	ByPubkey,
	ByKind,
	ByTimeline,
}

/// Picks the most selective access path for `filter`, in the order 4.D
/// states (ids, then tags, then pubkey+kind, then pubkey, then kind, then
/// the full timeline as a fallback).
pub fn choose_plan(filter: &Filter) -> Plan {
	if filter.ids_are_full_length() {
		return Plan::ById;
	}
	if !filter.tags.is_empty() {
		return Plan::ByTag;
	}
	let authors_are_keys = !filter.authors.is_empty() && filter.authors.iter().all(|a| a.len() == 32);
	if authors_are_keys
		&& !filter.kinds.is_empty()
		&& filter.authors.len() <= CARTESIAN_THRESHOLD
		&& filter.kinds.len() <= CARTESIAN_THRESHOLD
	{
		return Plan::ByPubkeyKind;
	}
	if authors_are_keys {
		return Plan::ByPubkey;
	}
	if !filter.kinds.is_empty() {
		return Plan::ByKind;
	}
	Plan::ByTimeline
}

#[cfg(test)]
mod test {
	use super::*;

	fn full_key(b: u8) -> Vec<u8> {
		vec![b; 32]
	}

	#[test]
	fn full_length_ids_win() {
		let mut f = Filter::new();
		f.ids = vec![full_key(1)];
		f.kinds = vec![1];
		assert_eq!(choose_plan(&f), Plan::ById);
	}

	#[test]
	fn short_id_prefix_falls_through_to_kind() {
		let mut f = Filter::new();
		f.ids = vec![vec![1, 2, 3]];
		f.kinds = vec![1];
		assert_eq!(choose_plan(&f), Plan::ByKind);
	}

	#[test]
	fn small_cartesian_uses_pubkey_kind() {
		let mut f = Filter::new();
		f.authors = vec![full_key(1), full_key(2)];
		f.kinds = vec![1, 4];
		assert_eq!(choose_plan(&f), Plan::ByPubkeyKind);
	}

	#[test]
	fn large_cartesian_falls_back_to_pubkey() {
		let mut f = Filter::new();
		f.authors = (0..9).map(full_key).collect();
		f.kinds = vec![1];
		assert_eq!(choose_plan(&f), Plan::ByPubkey);
	}

	#[test]
	fn no_constraints_uses_timeline() {
		let f = Filter::new();
		assert_eq!(choose_plan(&f), Plan::ByTimeline);
	}
}
