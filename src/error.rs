// Error taxonomy for the store. No panics or unwinds cross the crate
// boundary; every fallible operation returns `Result<T>`.

use std::fmt;

#[derive(Debug)]
pub enum Error {
	NullParam,
	FileOpen(std::io::Error),
	FileCreate(std::io::Error),
	FstatFailed(std::io::Error),
	FtruncateFailed(std::io::Error),
	MmapFailed(std::io::Error),
	InvalidMagic,
	VersionMismatch,
	Full,
	NotFound,
	Duplicate,
	InvalidEvent(String),
	IndexCorrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::NullParam => write!(f, "null parameter"),
			Error::FileOpen(e) => write!(f, "failed to open file: {}", e),
			Error::FileCreate(e) => write!(f, "failed to create file: {}", e),
			Error::FstatFailed(e) => write!(f, "fstat failed: {}", e),
			Error::FtruncateFailed(e) => write!(f, "ftruncate failed: {}", e),
			Error::MmapFailed(e) => write!(f, "mmap failed: {}", e),
			Error::InvalidMagic => write!(f, "invalid file magic"),
			Error::VersionMismatch => write!(f, "file version mismatch"),
			Error::Full => write!(f, "store is full"),
			Error::NotFound => write!(f, "not found"),
			Error::Duplicate => write!(f, "duplicate id"),
			Error::InvalidEvent(reason) => write!(f, "invalid event: {}", reason),
			Error::IndexCorrupt(reason) => write!(f, "index corrupt: {}", reason),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::FileOpen(e)
	}
}
