//! Local caching of remote artifacts and uploaded inputs.
//!
//! - [`ArtifactCache`] turns a remote artifact URL into a local reference,
//!   downloading at most once per cache key.
//! - [`UploadRecordStore`] remembers which local files were already
//!   uploaded to which provider.

mod fetcher;
mod gate;
mod upload_records;

pub use fetcher::{DownloadRequest, FetchError, FetchStatus, HttpResourceFetcher, ResourceFetcher};
pub use gate::{is_local_ref, local_path_of, to_local_ref, ArtifactCache, LOCAL_SCHEME};
pub use upload_records::{
    hash_file, SqliteUploadRecordStore, UploadRecord, UploadRecordError, UploadRecordStore,
};
