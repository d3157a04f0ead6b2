mod blob_storage;
mod filesystem;
mod register;

pub use blob_storage::BlobStorageBackend;
pub use filesystem::FileSystemBackend;
pub use register::BackendConfigs;
