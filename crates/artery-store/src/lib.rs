mod fs;
mod http;
mod memory;
mod store;

pub use fs::FsBucket;
pub use http::HttpBucket;
pub use memory::MemoryBucket;
pub use store::{ByteStream, ObjectMeta, ObjectStore, StoreError};
