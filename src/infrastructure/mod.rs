pub mod in_memory;
pub mod processors;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
