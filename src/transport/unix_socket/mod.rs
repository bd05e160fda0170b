//! Unix domain socket control transport

pub mod broadcast;
pub mod handler;
pub mod server;
pub mod session;

pub use {
    broadcast::BroadcastSink,
    handler::RequestHandler,
    server::UnixSocketServer,
    session::{SessionReader, UnixSocketSession},
};
