pub mod layout;
pub mod file_lock;
pub mod checkpoint;
pub mod revision;