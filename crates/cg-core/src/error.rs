//! Error types shared by the engine and its collaborators.

/// Failure reported by a collaborator (storage, tabs, identities).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Tab operation failed: {0}")]
    Tab(String),
    #[error("Identity provider error: {0}")]
    Identity(String),
    #[error("Unknown container: {0}")]
    UnknownContainer(String),
    #[error("Malformed stored record for '{key}': {reason}")]
    Decode { key: String, reason: String },
}

/// User input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name is required")]
    NameRequired,
    #[error("A container must be selected")]
    ContainerRequired,
    #[error("Invalid URL or hostname: {0}")]
    InvalidUrl(String),
    #[error("No such site: {0}")]
    UnknownSite(String),
}

/// Error from a settings operation: either bad input or a failing host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SitesError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Host(#[from] HostError),
}
