use thiserror::Error;

use crate::platform::{Permission, PlatformError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} permission is missing or was revoked")]
    PermissionDenied(Permission),
    #[error("media session platform failed: {0}")]
    Platform(String),
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl From<PlatformError> for ServiceError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied(permission) => ServiceError::PermissionDenied(permission),
            PlatformError::Unavailable(reason) => ServiceError::Platform(reason),
        }
    }
}

impl ServiceError {
    pub fn permission(&self) -> Option<Permission> {
        match self {
            ServiceError::PermissionDenied(permission) => Some(*permission),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_keep_their_permission() {
        let err = ServiceError::from(PlatformError::PermissionDenied(
            Permission::NotificationListener,
        ));
        assert_eq!(err.permission(), Some(Permission::NotificationListener));
        assert_eq!(
            err.to_string(),
            "notification listener permission is missing or was revoked"
        );
    }

    #[test]
    fn unavailable_maps_to_platform() {
        let err = ServiceError::from(PlatformError::Unavailable(String::from("binder died")));
        assert!(matches!(err, ServiceError::Platform(_)));
        assert_eq!(err.permission(), None);
    }
}
