pub mod base;
pub mod sdram;
pub mod sim;
pub mod traffic;
pub mod ui;
