// Per-store configuration. Grounded on the teacher's `options::Options` /
// `options::ColumnOptions` split: one struct for store-wide knobs.

use std::path::PathBuf;

pub const DEFAULT_EVENT_LOG_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_INDEX_FILE_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_CONTENT_CEILING: usize = 1024 * 1024;
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;
pub const DEFAULT_MAX_FILTERS_PER_SUBSCRIPTION: usize = 16;

#[derive(Debug, Clone)]
pub struct StoreOptions {
	pub path: PathBuf,
	pub event_log_size: u64,
	pub index_file_size: u64,
	pub content_ceiling: usize,
	pub subscription_capacity: usize,
	pub max_filters_per_subscription: usize,
}

impl StoreOptions {
	pub fn new<P: Into<PathBuf>>(path: P) -> StoreOptions {
		StoreOptions {
			path: path.into(),
			event_log_size: DEFAULT_EVENT_LOG_SIZE,
			index_file_size: DEFAULT_INDEX_FILE_SIZE,
			content_ceiling: DEFAULT_CONTENT_CEILING,
			subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
			max_filters_per_subscription: DEFAULT_MAX_FILTERS_PER_SUBSCRIPTION,
		}
	}
}
