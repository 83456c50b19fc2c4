pub mod buffer;