//! Command implementations

pub mod dlq;
pub mod extract;
pub mod scraper;
pub mod worker;
