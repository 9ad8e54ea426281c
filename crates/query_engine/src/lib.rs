mod coalesce;
mod downsample;
mod filter_builder;
mod projection;
mod reading_query_service;

pub use coalesce::*;
pub use downsample::*;
pub use filter_builder::*;
pub use projection::*;
pub use reading_query_service::*;
