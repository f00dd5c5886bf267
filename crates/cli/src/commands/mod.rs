pub mod doctor;
pub mod metrics;
pub mod models;
pub mod serve;
