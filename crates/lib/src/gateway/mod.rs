//! Gateway: HTTP server wiring the reply engine to its transports.
//!
//! Serves a health probe and the Telegram webhook on one port, runs the engine
//! event loop, and shuts everything down on SIGINT/SIGTERM.

mod server;

pub use server::{router, run_gateway, GatewayState};
