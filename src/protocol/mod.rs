pub mod command;
pub mod direct;
pub mod status;
