pub mod analysis;
pub mod store;
pub mod tabular;
pub mod uploads;
