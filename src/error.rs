use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("port {port} does not support EUI-48 addresses (address length {len})")]
    UnsupportedAddress { port: String, len: usize },

    #[error("port {port} does not support sending with a foreign source address")]
    SendFromUnsupported { port: String },

    #[error("unknown hierarchy role: {0}")]
    UnknownHierarchy(String),

    #[error("unknown switch mode: {0}")]
    UnknownMode(String),

    #[error("unknown port id {0}")]
    UnknownPort(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
