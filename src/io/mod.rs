pub mod config_io;
pub mod http;
pub mod transport;

#[cfg(test)]
pub mod test_support;
