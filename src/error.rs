//! Error type shared by the mapping, session and lifecycle layers.

use core::fmt;

use axerrno::AxError;

/// Errors raised while bringing a UIO device up, serving sessions on it, or
/// tearing it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UioError {
    /// No memory resource of the platform device could be mapped.
    NoResource,
    /// The device record could not be allocated.
    AllocationFailure,
    /// The session host rejected the device.
    RegistrationFailure(AxError),
    /// The attribute collaborator failed to publish the device attributes.
    AttributeFailure(AxError),
    /// `close` was called with no outstanding open.
    NotOpen,
    /// The poll worker thread could not be spawned.
    WorkerCreationFailure,
    /// The lifecycle has no registered device.
    NotRegistered,
    /// The lifecycle already holds a registered device.
    AlreadyRegistered,
    /// The device was removed; its session no longer accepts opens.
    Removed,
}

/// Result alias used throughout the crate.
pub type UioResult<T = ()> = Result<T, UioError>;

impl fmt::Display for UioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResource => f.write_str("no memory resource could be mapped"),
            Self::AllocationFailure => f.write_str("failed to allocate device record"),
            Self::RegistrationFailure(err) => write!(f, "session host rejected device: {err:?}"),
            Self::AttributeFailure(err) => write!(f, "failed to publish device attributes: {err:?}"),
            Self::NotOpen => f.write_str("device is not open"),
            Self::WorkerCreationFailure => f.write_str("failed to start poll worker"),
            Self::NotRegistered => f.write_str("no device registered"),
            Self::AlreadyRegistered => f.write_str("device already registered"),
            Self::Removed => f.write_str("device has been removed"),
        }
    }
}

impl core::error::Error for UioError {}

impl From<UioError> for AxError {
    fn from(err: UioError) -> Self {
        match err {
            UioError::NoResource | UioError::Removed => AxError::NotFound,
            UioError::AllocationFailure => AxError::NoMemory,
            UioError::RegistrationFailure(inner) | UioError::AttributeFailure(inner) => inner,
            UioError::NotOpen | UioError::NotRegistered => AxError::BadState,
            UioError::WorkerCreationFailure => AxError::ResourceBusy,
            UioError::AlreadyRegistered => AxError::AlreadyExists,
        }
    }
}

impl From<alloc::collections::TryReserveError> for UioError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::AllocationFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(AxError::from(UioError::NoResource), AxError::NotFound);
        assert_eq!(AxError::from(UioError::AllocationFailure), AxError::NoMemory);
        assert_eq!(AxError::from(UioError::NotOpen), AxError::BadState);
        assert_eq!(
            AxError::from(UioError::RegistrationFailure(AxError::ResourceBusy)),
            AxError::ResourceBusy
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(UioError::NotOpen.to_string(), "device is not open");
        assert_eq!(
            UioError::NoResource.to_string(),
            "no memory resource could be mapped"
        );
    }
}
