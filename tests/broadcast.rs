// Integration coverage for the write -> index -> broadcast sequence
// spec.md 5 requires be strict: a host appends through `Store`, then asks
// a `SubscriptionRegistry` for matches and fans out via callback. Neither
// type owns the other (spec.md 9's "no global singletons" / "owned Store
// and SubscriptionRegistry threaded through the host"), so these tests
// play the host's role directly, the way spec.md 2's data-flow section
// describes it.

use std::fs;
use std::path::PathBuf;

use nostr_store::{open_store, Event, Filter, StoreOptions, SubscriptionRegistry};

struct TempDir(PathBuf);

impl TempDir {
	fn new(name: &'static str) -> TempDir {
		env_logger::try_init().ok();
		let mut path = std::env::temp_dir();
		path.push("nostr-store-test");
		path.push("broadcast");
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

fn sample_event(id_byte: u8, kind: u32, created_at: i64) -> Event {
	Event::new([id_byte; 32], [id_byte.wrapping_add(1); 32], [id_byte.wrapping_add(2); 64], kind, created_at, "hi".into(), vec![])
}

/// Scenario 6 of spec.md 8: subscribing twice under the same
/// (client, subscription_id) replaces filters rather than stacking a
/// second subscription, and a write after appends drives exactly the
/// callbacks the *current* filter set predicts.
#[test]
fn append_then_subscribe_then_append_fires_matching_callback_once() {
	let dir = TempDir::new("append_then_subscribe");
	let mut store = open_store(&StoreOptions::new(dir.0.clone())).unwrap();
	let mut registry = SubscriptionRegistry::new(256, 16);

	let mut f = Filter::new();
	f.kinds = vec![1];
	registry.add(1, "s", vec![f]).unwrap();

	let matching = sample_event(1, 1, 1_700_000_000);
	store.append_event(&matching).unwrap();
	let mut calls = 0;
	registry.for_each_match(&matching, |sub| {
		assert_eq!(sub.client_id, 1);
		assert_eq!(sub.subscription_id, "s");
		calls += 1;
	});
	assert_eq!(calls, 1);

	let non_matching = sample_event(2, 4, 1_700_000_001);
	store.append_event(&non_matching).unwrap();
	let mut calls = 0;
	registry.for_each_match(&non_matching, |_| calls += 1);
	assert_eq!(calls, 0);
}

/// Two distinct clients subscribed to overlapping kinds each get their
/// own callback; an event outside both filters drives zero.
#[test]
fn fan_out_reaches_every_matching_client_independently() {
	let dir = TempDir::new("fan_out");
	let mut store = open_store(&StoreOptions::new(dir.0.clone())).unwrap();
	let mut registry = SubscriptionRegistry::new(256, 16);

	let mut f1 = Filter::new();
	f1.kinds = vec![1, 4];
	registry.add(10, "a", vec![f1]).unwrap();

	let mut f2 = Filter::new();
	f2.kinds = vec![4];
	registry.add(20, "b", vec![f2]).unwrap();

	let event = sample_event(5, 4, 1_700_000_000);
	store.append_event(&event).unwrap();

	let mut clients = Vec::new();
	registry.for_each_match(&event, |sub| clients.push(sub.client_id));
	clients.sort();
	assert_eq!(clients, vec![10, 20]);

	let kind1_only = sample_event(6, 1, 1_700_000_001);
	store.append_event(&kind1_only).unwrap();
	let mut clients = Vec::new();
	registry.for_each_match(&kind1_only, |sub| clients.push(sub.client_id));
	assert_eq!(clients, vec![10]);
}

/// Closing a subscription stops it from ever firing again, even though
/// the event it would have matched still lands in the store and in
/// historical `query` results.
#[test]
fn close_removes_subscription_but_not_history() {
	let dir = TempDir::new("close_removes_subscription");
	let mut store = open_store(&StoreOptions::new(dir.0.clone())).unwrap();
	let mut registry = SubscriptionRegistry::new(256, 16);

	let mut f = Filter::new();
	f.kinds = vec![1];
	registry.add(1, "s", vec![f]).unwrap();
	assert!(registry.remove(1, "s"));

	let event = sample_event(1, 1, 1_700_000_000);
	store.append_event(&event).unwrap();
	let mut calls = 0;
	registry.for_each_match(&event, |_| calls += 1);
	assert_eq!(calls, 0);

	let mut query_filter = Filter::new();
	query_filter.kinds = vec![1];
	assert_eq!(store.query(&query_filter).unwrap().len(), 1);
}

/// Disconnecting a client removes every subscription it owned, while
/// another client's subscriptions on the same store keep firing.
#[test]
fn disconnect_removes_all_subscriptions_for_that_client_only() {
	let dir = TempDir::new("disconnect_removes_all");
	let mut store = open_store(&StoreOptions::new(dir.0.clone())).unwrap();
	let mut registry = SubscriptionRegistry::new(256, 16);

	registry.add(1, "a", vec![Filter::new()]).unwrap();
	registry.add(1, "b", vec![Filter::new()]).unwrap();
	registry.add(2, "c", vec![Filter::new()]).unwrap();

	assert_eq!(registry.remove_all_for(1), 2);

	let event = sample_event(1, 1, 1_700_000_000);
	store.append_event(&event).unwrap();
	let mut clients = Vec::new();
	registry.for_each_match(&event, |sub| clients.push(sub.client_id));
	assert_eq!(clients, vec![2]);
}
