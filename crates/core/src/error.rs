use thiserror::Error;

/// Errors raised by the protocol engine.
///
/// Per-command failures never reach here; they are turned into `Status`
/// elements by the dispatcher. Only failures that abort the whole response
/// (framing, parsing) are represented.
#[derive(Debug, Error)]
pub enum Error {
    /// The WBXML header or body ran out of bytes before a structure was complete
    #[error("malformed WBXML frame: {0}")]
    MalformedFrame(String),

    /// A code-page token had no tag mapping and no literal override
    #[error("unknown WBXML token 0x{code:02X} on code page 0x{page:02X}")]
    UnknownToken {
        /// code page the token was read on
        page: u8,
        /// raw token byte (flags stripped)
        code: u8,
    },

    /// An inline string or literal tag name was not valid UTF-8
    #[error("WBXML string is not valid UTF-8")]
    DecodingError,

    /// The XML body was not well-formed, or required SyncML elements were missing
    #[error("SyncML parse error: {0}")]
    ParseError(String),

    /// The package manifest could not be read or parsed
    #[error("catalog I/O error: {0}")]
    CatalogIo(String),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(e: quick_xml::DeError) -> Self {
        Error::ParseError(e.to_string())
    }
}
