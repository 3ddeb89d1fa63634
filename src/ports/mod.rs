//! Port traits the domain is written against.

pub mod config_port;
pub mod data_port;
pub mod order_port;
