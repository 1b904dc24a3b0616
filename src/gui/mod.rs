pub mod application;
pub mod preview;
pub mod style;
pub mod subscription;
pub mod types;
