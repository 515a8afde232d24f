mod connection;
mod dialect;

pub use connection::connect;
pub use dialect::Dialect;
