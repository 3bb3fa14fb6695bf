//! Parley core library — reply engine, completion client, channels, and gateway
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod init;
pub mod llm;
