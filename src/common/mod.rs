mod cache;
mod shutdown;

pub use cache::MemCache;
pub use shutdown::Shutdown;
