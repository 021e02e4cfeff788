pub mod blob_store;

pub use blob_store::{BlobError, BlobStore, CloudinaryStore, Destroyed, MemoryBlobStore};
