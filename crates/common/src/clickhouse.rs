mod client;
mod reading_repository;

pub use client::*;
pub use reading_repository::*;
