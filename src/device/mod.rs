pub mod btle;
pub mod constants;
pub mod link;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
