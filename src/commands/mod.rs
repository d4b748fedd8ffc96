pub mod loadtest;
pub mod serve;
