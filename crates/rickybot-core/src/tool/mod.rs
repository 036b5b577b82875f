pub mod calculator;
pub mod executor;
