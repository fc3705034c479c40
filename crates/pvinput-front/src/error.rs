use thiserror::Error;

/// Failure to acquire one of the platform services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(&'static str),

    #[error("registration rejected: {0}")]
    RegistrationRejected(&'static str),
}

/// Configuration-store failures.
///
/// Transactional all-or-nothing semantics are owned by the store
/// implementation: a failed write aborts the whole transaction and no
/// partial keys are left published.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such key: {path}/{key}")]
    NoEntry { path: String, key: String },

    #[error("store write failed: {0}")]
    WriteFailed(&'static str),

    #[error("store transaction aborted")]
    Aborted,
}

/// Memory-grant service failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("grant cache creation failed: {0}")]
    Cache(&'static str),

    #[error("grant table exhausted")]
    Exhausted,

    #[error("foreign access denied: {0}")]
    Denied(&'static str),
}

/// Signal-channel service failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no free event ports")]
    NoPorts,

    #[error("channel open failed: {0}")]
    OpenFailed(&'static str),
}

/// Why a connect attempt failed.
///
/// Every variant is fatal and fully rolled back: after a failed
/// [`RingEngine::connect`](crate::ring::RingEngine::connect) no partial
/// resource remains provisioned.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to acquire {service} service")]
    Service {
        service: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error("failed to create grant cache")]
    CacheCreate(#[source] GrantError),

    #[error("failed to grant ring page to backend")]
    Grant(#[source] GrantError),

    #[error("failed to open event channel")]
    ChannelOpen(#[source] ChannelError),

    #[error("failed to register diagnostics callback")]
    DebugRegister(#[source] ServiceError),
}
