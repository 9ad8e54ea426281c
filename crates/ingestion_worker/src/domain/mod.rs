mod aggregation;
mod debounce_scheduler;
mod emission_sink;
mod field_update;
mod min_distance_scheduler;
mod reading_handlers;
mod reading_ingestion_service;

pub use aggregation::*;
pub use debounce_scheduler::*;
pub use emission_sink::*;
pub use field_update::*;
pub use min_distance_scheduler::*;
pub use reading_handlers::*;
pub use reading_ingestion_service::*;
