//! Control transports

pub mod unix_socket;
