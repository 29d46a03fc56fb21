pub mod config;
pub mod device;
pub mod perf_log;
pub mod top;
pub mod trace;
