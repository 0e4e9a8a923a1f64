pub mod canonical;
pub mod dashboard;
pub mod mapping;
