pub mod hashing;
pub mod io;
pub mod net;

// Re-exports for convenience
pub use hashing::{hash_bytes, hash_file, hash_files, HashError};
pub use io::is_too_many_open_files;
pub use net::HttpRemoteFeed;
