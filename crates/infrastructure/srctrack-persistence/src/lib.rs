mod api;
mod codec;
mod error;
mod lock;
mod object_store;
mod paths;
mod redb_index;
mod tracking_file;
mod tracking_store;

pub use api::*;
pub use error::*;
pub use lock::FileLock;
pub use object_store::ObjectStore;
pub use paths::{normalize_rel_path, validate_relative_path, StoreLayout};
pub use redb_index::RedbShadowIndex;
pub use tracking_file::{
    decode_tracking_file, encode_tracking_file, upgrade_legacy, LegacyMember, TrackingFileV0,
    TrackingFileV1, TrackingState,
};
pub use tracking_store::{LoadedTracking, TrackingFileStore};
