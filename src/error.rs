use thiserror::Error;

/// Errors surfaced by the analytics core
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("sample is missing a device id")]
    MissingDeviceId,
    #[error("sample request rate is not a finite number")]
    NonFiniteValue,
}

/// Errors from a cache gateway. The service logs these and carries on.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode cache value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode cache value: {0}")]
    Decode(#[source] serde_json::Error),
}
