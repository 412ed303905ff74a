//
// The error type used internally by all handlers, and the
// mapping to HTTP status codes and precondition/postcondition
// XML error bodies (RFC4918 #16).
//
use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;

use crate::body::Body;
use crate::fs::FsError;
use crate::ls::DavLock;
use crate::util::dav_xml_error;

pub(crate) type DavResult<T> = Result<T, DavError>;

#[derive(Debug)]
pub(crate) enum DavError {
    XmlReadError,
    XmlParseError,
    InvalidPath,
    UnknownDavMethod,
    Status(StatusCode),
    StatusClose(StatusCode),
    FsError(FsError),
    IoError(io::Error),
    /// A mutating request did not submit a token for a lock it needed,
    /// or a LOCK request was blocked by someone else's lock.
    Locked(DavLock),
    /// A new lock request collided with an existing lock.
    ConflictingLock(DavLock),
    /// UNLOCK presented a token that matches no lock on the request uri.
    LockTokenMatchesRequestUri,
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DavError::Status(s) => write!(f, "{s}"),
            DavError::StatusClose(s) => write!(f, "{s}"),
            DavError::FsError(e) => write!(f, "{e:?}"),
            DavError::IoError(e) => write!(f, "{e}"),
            DavError::Locked(l) => write!(f, "locked by <opaquelocktoken:{}>", l.token),
            DavError::ConflictingLock(l) => {
                write!(f, "conflicts with <opaquelocktoken:{}>", l.token)
            }
            _ => write!(f, "{self:?}"),
        }
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::UNPROCESSABLE_ENTITY,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::Status(s) => *s,
            DavError::StatusClose(s) => *s,
            DavError::FsError(e) => fserror_to_status(e),
            DavError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Locked(_) => StatusCode::LOCKED,
            DavError::ConflictingLock(_) => StatusCode::LOCKED,
            DavError::LockTokenMatchesRequestUri => StatusCode::CONFLICT,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        !matches!(
            self,
            DavError::Status(_)
                | DavError::FsError(_)
                | DavError::Locked(_)
                | DavError::ConflictingLock(_)
                | DavError::LockTokenMatchesRequestUri
        )
    }

    // Structured <D:error> body, where the condition has one.
    pub(crate) fn xml_error_body(&self) -> Option<Body> {
        match self {
            DavError::Locked(lock) | DavError::ConflictingLock(lock) => {
                // href as the client addresses it, prefix included.
                Some(dav_xml_error(&format!(
                    "<D:lock-token-submitted><D:href>{}</D:href></D:lock-token-submitted>",
                    lock.path.with_prefix().as_url_string()
                )))
            }
            DavError::LockTokenMatchesRequestUri => {
                Some(dav_xml_error("<D:lock-token-matches-request-uri/>"))
            }
            _ => None,
        }
    }
}

pub(crate) fn fserror_to_status(e: &FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<xmltree::ParseError> for DavError {
    fn from(_: xmltree::ParseError) -> Self {
        DavError::XmlReadError
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        match e {
            xml::writer::Error::Io(e) => DavError::IoError(e),
            _ => DavError::XmlParseError,
        }
    }
}
