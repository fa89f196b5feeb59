//! IMAP error types.

use std::io::Error as IoError;
use std::net::TcpStream;
use std::result;

use native_tls::Error as TlsError;
use native_tls::HandshakeError as TlsHandshakeError;
use thiserror::Error;

/// A convenience wrapper around `Result` for `mailsession::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur while managing a mailbox session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    #[error(transparent)]
    Io(#[from] IoError),
    /// An error from the `native_tls` library during the TLS handshake.
    #[error(transparent)]
    TlsHandshake(#[from] TlsHandshakeError<TcpStream>),
    /// An error from the `native_tls` library while managing the socket.
    #[error(transparent)]
    Tls(#[from] TlsError),
    /// A BAD response from the server.
    #[error("Bad Response: {0}")]
    Bad(String),
    /// A NO response from the server.
    #[error("No Response: {0}")]
    No(String),
    /// The connection was terminated unexpectedly.
    #[error("Connection Lost")]
    ConnectionLost,
    /// Error parsing a server response or a connection string.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Error validating input data.
    #[error(transparent)]
    Validate(#[from] ValidateError),
    /// Opening or reopening the transport handle failed. Carries the transport's last
    /// diagnostic message.
    #[error("Connection failed: {0}")]
    Connection(String),
    /// A message position or UID could not be resolved.
    #[error("Message not found: {0}")]
    NotFound(String),
}

/// An error occurred while trying to parse a server response or a connection string.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Indicates an error parsing the status response. Such as OK, NO, and BAD.
    #[error("Unable to parse status response")]
    Invalid(Vec<u8>),
    /// The client received a response that was valid but not the one it expected.
    #[error("Unexpected response: {0}")]
    Unexpected(String),
    /// The connection string did not have the `{host[:port][/flag]*}[mailbox]` shape.
    #[error("Unable to parse connection string {0:?}")]
    ConnectionString(String),
}

/// An input was rejected before anything was sent to the server.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidateError {
    /// Invalid character found in a quoted string.
    // print character in debug form because invalid ones are often whitespaces
    #[error("Invalid character in input: {0:?}")]
    Char(char),
    /// A connection flag key or value was malformed.
    #[error("Invalid connection flag: {0:?}")]
    Flag(String),
    /// The server host was empty or contained reserved characters.
    #[error("Invalid host: {0:?}")]
    Host(String),
    /// Port `0` cannot be connected to.
    #[error("Invalid port: {0}")]
    Port(u16),
    /// The option bitmask was not a non-negative 32-bit integer.
    #[error("Invalid option bitmask: {0}")]
    Options(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_carries_diagnostic() {
        let e = Error::Connection("Certificate failure for mail.example.org".to_string());
        assert_eq!(
            e.to_string(),
            "Connection failed: Certificate failure for mail.example.org"
        );
    }

    #[test]
    fn validate_error_converts() {
        let e: Error = ValidateError::Options(-1).into();
        match e {
            Error::Validate(ValidateError::Options(-1)) => {}
            e => panic!("Wrong error: {:?}", e),
        }
    }
}
