pub mod addr;
pub mod command;
pub mod config;
pub mod controller;
pub mod datapath;
pub mod engine;
pub mod init;
pub mod refresh;
pub mod stats;

#[cfg(test)]
mod tests;
