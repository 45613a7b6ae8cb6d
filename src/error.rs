//! Error types shared by every beatcast component

use std::io;
use std::net::SocketAddrV4;
use std::path::PathBuf;

/// Errors surfaced by the distribution core
///
/// Transport faults are fatal either at construction (bind/join) or for the
/// loop that hit them (send/receive). Bounds violations and foreign or short
/// datagrams are never errors; they are reported through `Option`/`bool`
/// and [`crate::pattern::MergeOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not bind {role} socket on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("could not join multicast group {group} on {interface}: {source}")]
    Join {
        group: SocketAddrV4,
        interface: std::net::Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("could not write pattern to {addr}: {source}")]
    Send {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("error while reading pattern updates: {0}")]
    Receive(#[source] io::Error),

    #[error("tempo reference unavailable: {0}")]
    TempoReference(String),

    #[error("tick source stopped producing ticks")]
    TickSourceStopped,

    #[error("publisher stopped")]
    PublisherStopped,

    #[error("control surface error: {0}")]
    Surface(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for beatcast operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_failure() {
        let err = Error::Bind {
            role: "subscriber",
            addr: "224.2.2.3:9999".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(
            err.to_string(),
            "could not bind subscriber socket on 224.2.2.3:9999: in use"
        );

        let err = Error::Receive(io::Error::new(io::ErrorKind::Other, "closed"));
        assert_eq!(err.to_string(), "error while reading pattern updates: closed");
    }

    #[test]
    fn test_io_errors_convert() {
        fn fails() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(Error::Io(_))));
    }
}
