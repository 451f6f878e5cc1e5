use std::io::{self, ErrorKind};

use http::StatusCode;
use xml::reader::Error as XmlReaderError;
use xmltree::ParseError as XmlParseError;

use crate::fs::FsError;

pub(crate) type DavResult<T> = Result<T, DavError>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum DavError {
    #[error("XML parse error")]
    XmlReadError,
    #[error("XML parse error")]
    XmlParseError,
    #[error("invalid path")]
    InvalidPath,
    #[error("unknown method")]
    UnknownDavMethod,
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("store error: {0}")]
    FsError(#[from] FsError),
    #[error("status {0}")]
    Status(StatusCode),
    #[error("status {0} (close connection)")]
    StatusClose(StatusCode),
}

impl From<XmlReaderError> for DavError {
    fn from(_e: XmlReaderError) -> Self {
        DavError::XmlReadError
    }
}

impl From<XmlParseError> for DavError {
    fn from(_e: XmlParseError) -> Self {
        DavError::XmlParseError
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        match e {
            xml::writer::Error::Io(e) => DavError::IoError(e),
            _ => DavError::IoError(io::Error::new(ErrorKind::Other, e.to_string())),
        }
    }
}

impl From<StatusCode> for DavError {
    fn from(e: StatusCode) -> Self {
        DavError::Status(e)
    }
}

fn fserror_to_status(e: &FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::CONFLICT,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::AccessDenied => StatusCode::FORBIDDEN,
        FsError::Unauthenticated => StatusCode::FORBIDDEN,
    }
}

fn ioerror_to_status(ioerror: &io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match *self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::IoError(ref e) => ioerror_to_status(e),
            DavError::FsError(ref e) => fserror_to_status(e),
            DavError::Status(e) => e,
            DavError::StatusClose(e) => e,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        !matches!(
            self,
            &DavError::Status(_)
                | &DavError::FsError(FsError::NotFound)
                | &DavError::FsError(FsError::AccessDenied)
                | &DavError::FsError(FsError::Exists)
        )
    }

    /// Store failures are the only errors worth logging loudly.
    pub(crate) fn is_store_failure(&self) -> bool {
        matches!(
            self,
            DavError::FsError(FsError::GeneralFailure(_)) | DavError::IoError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_status() {
        assert_eq!(
            DavError::from(FsError::AccessDenied).statuscode(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            DavError::from(FsError::Unauthenticated).statuscode(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            DavError::from(FsError::NotFound).statuscode(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DavError::from(FsError::GeneralFailure("x".into())).statuscode(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(DavError::from(FsError::GeneralFailure("x".into())).is_store_failure());
        assert!(!DavError::from(StatusCode::LOCKED).must_close());
    }

    #[test]
    fn malformed_requests_are_bad_requests() {
        for e in [
            DavError::XmlReadError,
            DavError::XmlParseError,
            DavError::InvalidPath,
        ] {
            assert_eq!(e.statuscode(), StatusCode::BAD_REQUEST, "{e}");
            assert!(!e.is_store_failure());
        }
        assert_eq!(
            DavError::UnknownDavMethod.statuscode(),
            StatusCode::NOT_IMPLEMENTED
        );
    }
}
