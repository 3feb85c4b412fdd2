//! Crate-wide error kinds.
//!
//! Every handler surfaces failures as one of these variants; nothing
//! unwinds past the connection loop (see [`crate::server::connection`]) —
//! the loop either turns an error into a status code or silently closes the
//! socket, per the framing/client/policy/resource/transport/fatal-startup
//! split below.

use crate::http::types::StatusCode;
use std::{error, fmt, io};

/// Errors that can occur while parsing a request, resolving a file, running
/// a CGI script, or serving a response.
#[derive(Debug)]
pub(crate) enum ServerError {
    // --- Framing: abort the connection, no recoverable response ---
    /// Start line did not split into exactly method/path/version (or the
    /// HTTP/0.9-implicit two-token form).
    MalformedStartLine,
    /// A header or start line was terminated by a bare `\n` without a
    /// preceding `\r`.
    MissingCarriageReturn,
    /// `Content-Length` header present but not a valid, non-negative integer.
    InvalidContentLength,

    // --- Client: respond with a 4xx ---
    HeadersTooLarge,
    UriTooLong,
    BadUri,
    DisallowedPath,
    RangeNotSatisfiable,
    UnsupportedVersion,
    /// `Content-Length` exceeds `MaxRequestBody`.
    BodyTooLarge,

    // --- Policy: respond with a 4xx, no framing problem ---
    AccessDenied,
    NotFound,
    NotAcceptable,
    LinkRejected,
    MethodNotAllowed,

    // --- Resource: respond with 5xx, log at error level ---
    Io(IoError),
    CompressorFailure,
    CgiSpawnFailure(IoError),

    // --- Transport: silently close, log only on handshake failure ---
    TlsHandshake(IoError),

    // --- Fatal at startup: abort the process ---
    ConfigParse(String),
    LogFileOpen(IoError),
    AllListenersFailed,
}

impl ServerError {
    /// The status code a handler should set when this error reaches the
    /// response builder. Framing and transport errors have no status: the
    /// connection closes before (or without) a response being framed.
    pub(crate) fn status_code(&self) -> Option<StatusCode> {
        use ServerError::*;
        Some(match self {
            MalformedStartLine | MissingCarriageReturn | TlsHandshake(_) => return None,
            InvalidContentLength | BadUri | DisallowedPath => StatusCode::BadRequest,
            HeadersTooLarge => StatusCode::RequestHeaderFieldsTooLarge,
            UriTooLong => StatusCode::UriTooLong,
            BodyTooLarge => StatusCode::PayloadTooLarge,
            RangeNotSatisfiable => StatusCode::RangeNotSatisfiable,
            UnsupportedVersion => StatusCode::HttpVersionNotSupported,
            AccessDenied | LinkRejected => StatusCode::Forbidden,
            NotFound => StatusCode::NotFound,
            NotAcceptable => StatusCode::NotAcceptable,
            MethodNotAllowed => StatusCode::MethodNotAllowed,
            Io(_) | CompressorFailure => StatusCode::InternalServerError,
            CgiSpawnFailure(_) => StatusCode::BadGateway,
            ConfigParse(_) | LogFileOpen(_) | AllListenersFailed => return None,
        })
    }

    /// Whether this error should close the connection regardless of what
    /// Connection-header logic would otherwise decide.
    pub(crate) fn forces_close(&self) -> bool {
        matches!(
            self,
            ServerError::MalformedStartLine
                | ServerError::MissingCarriageReturn
                | ServerError::TlsHandshake(_)
                | ServerError::Io(_)
        )
    }
}

impl error::Error for ServerError {}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::Io(IoError(err))
    }
}

impl From<regex::Error> for ServerError {
    fn from(err: regex::Error) -> Self {
        ServerError::ConfigParse(err.to_string())
    }
}

impl From<quick_xml::DeError> for ServerError {
    fn from(err: quick_xml::DeError) -> Self {
        ServerError::ConfigParse(err.to_string())
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_errors_have_no_status() {
        assert_eq!(ServerError::MalformedStartLine.status_code(), None);
        assert!(ServerError::MalformedStartLine.forces_close());
    }

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(ServerError::BadUri.status_code(), Some(StatusCode::BadRequest));
        assert_eq!(
            ServerError::HeadersTooLarge.status_code(),
            Some(StatusCode::RequestHeaderFieldsTooLarge)
        );
        assert_eq!(
            ServerError::RangeNotSatisfiable.status_code(),
            Some(StatusCode::RangeNotSatisfiable)
        );
    }

    #[test]
    fn cgi_spawn_failure_is_bad_gateway() {
        let err = ServerError::CgiSpawnFailure(IoError(io::Error::new(io::ErrorKind::Other, "x")));
        assert_eq!(err.status_code(), Some(StatusCode::BadGateway));
    }
}
