mod in_memory_reading_repository;
mod reading;
mod reading_repository;
mod result;
mod sensor;

pub use in_memory_reading_repository::*;
pub use reading::*;
pub use reading_repository::*;
pub use result::*;
pub use sensor::*;
