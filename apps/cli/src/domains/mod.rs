pub mod config;
pub mod cursor;
pub mod sync;
