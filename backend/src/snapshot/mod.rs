pub mod filter;
pub mod index;
pub mod memory;
pub mod source;
pub mod sqlx_source;
pub mod types;
