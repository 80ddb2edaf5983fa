// 4.E Subscription registry & matcher: a fixed-capacity table of active
// subscriptions, tested against freshly-written events with the same
// predicate semantics as the query planner (`filter::matches`). Matching
// is in-memory only; it never touches the indexes.

use crate::error::{Error, Result};
use crate::event::Event;
use crate::filter::{self, Filter};

pub type ClientId = u64;

const MAX_SUBSCRIPTION_ID_LEN: usize = 64;

pub struct Subscription {
	pub client_id: ClientId,
	pub subscription_id: String,
	pub filters: Vec<Filter>,
}

struct Slot {
	active: bool,
	sub: Subscription,
}

pub struct SubscriptionRegistry {
	slots: Vec<Slot>,
	max_filters_per_subscription: usize,
}

impl SubscriptionRegistry {
	pub fn new(capacity: usize, max_filters_per_subscription: usize) -> SubscriptionRegistry {
		let mut slots = Vec::with_capacity(capacity);
		for _ in 0..capacity {
			slots.push(Slot {
				active: false,
				sub: Subscription { client_id: 0, subscription_id: String::new(), filters: Vec::new() },
			});
		}
		SubscriptionRegistry { slots, max_filters_per_subscription }
	}

	/// Adds or, for an idempotent re-subscription of the same
	/// `(client, subscription_id)`, overwrites the filters of an existing
	/// active slot. Returns the slot index.
	pub fn add(&mut self, client: ClientId, subscription_id: &str, filters: Vec<Filter>) -> Result<usize> {
		if subscription_id.len() > MAX_SUBSCRIPTION_ID_LEN {
			return Err(Error::InvalidEvent(format!(
				"subscription id length {} exceeds {}",
				subscription_id.len(),
				MAX_SUBSCRIPTION_ID_LEN
			)));
		}
		if filters.len() > self.max_filters_per_subscription {
			return Err(Error::InvalidEvent(format!(
				"filter count {} exceeds {}",
				filters.len(),
				self.max_filters_per_subscription
			)));
		}

		if let Some(index) = self.find_active(client, subscription_id) {
			self.slots[index].sub.filters = filters;
			log::debug!(target: "nostr-store", "Resubscribed {} / {}", client, subscription_id);
			return Ok(index);
		}

		for (index, slot) in self.slots.iter_mut().enumerate() {
			if !slot.active {
				slot.active = true;
				slot.sub = Subscription { client_id: client, subscription_id: subscription_id.to_string(), filters };
				log::debug!(target: "nostr-store", "Subscribed {} / {} at slot {}", client, subscription_id, index);
				return Ok(index);
			}
		}
		Err(Error::Full)
	}

	fn find_active(&self, client: ClientId, subscription_id: &str) -> Option<usize> {
		self.slots
			.iter()
			.position(|slot| slot.active && slot.sub.client_id == client && slot.sub.subscription_id == subscription_id)
	}

	pub fn remove(&mut self, client: ClientId, subscription_id: &str) -> bool {
		match self.find_active(client, subscription_id) {
			Some(index) => {
				self.slots[index].active = false;
				true
			}
			None => false,
		}
	}

	pub fn remove_all_for(&mut self, client: ClientId) -> usize {
		let mut count = 0;
		for slot in &mut self.slots {
			if slot.active && slot.sub.client_id == client {
				slot.active = false;
				count += 1;
			}
		}
		count
	}

	/// Tests `event` against every active subscription's filters, invoking
	/// `visit` once per subscription that matches at least one filter.
	pub fn for_each_match(&self, event: &Event, mut visit: impl FnMut(&Subscription)) {
		for slot in &self.slots {
			if slot.active && slot.sub.filters.iter().any(|f| filter::matches(f, event)) {
				visit(&slot.sub);
			}
		}
	}
}
