mod file;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;
