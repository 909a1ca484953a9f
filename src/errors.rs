use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error-plantpush-config-1 Required environment variable not set: {var_name}")]
    EnvVarRequired { var_name: String },

    #[error("error-plantpush-config-2 Version not available")]
    VersionNotAvailable,

    #[error("error-plantpush-config-3 Invalid port number: {port}")]
    InvalidPortNumber { port: String },

    #[error("error-plantpush-config-4 Invalid value: {details}")]
    InvalidValue { details: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("error-plantpush-store-1 Connection failed: {details}")]
    ConnectionFailed { details: String },

    #[error("error-plantpush-store-2 Operation failed: {operation}: {details}")]
    OperationFailed { operation: String, details: String },
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("error-plantpush-gateway-1 API key not configured")]
    MissingApiKey,

    #[error("error-plantpush-gateway-2 Request failed: {details}")]
    RequestFailed { details: String },

    #[error("error-plantpush-gateway-3 Unexpected response: status={status}: {details}")]
    UnexpectedResponse { status: u16, details: String },
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("error-plantpush-chain-1 Plant fetch failed for {address}: {details}")]
    FetchFailed { address: String, details: String },
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("error-plantpush-http-100 Unhandled web error: {details}")]
    Unhandled { details: String },

    #[error("error-plantpush-http-101 Request validation failed: {details}")]
    RequestValidation { details: String },

    #[error("error-plantpush-http-105 Unauthorized: {details}")]
    Unauthorized { details: String },

    #[error("error-plantpush-http-107 Forbidden: {details}")]
    Forbidden { details: String },

    #[error("error-plantpush-http-108 Service not configured: {hint}")]
    NotConfigured { hint: String },

    #[error("error-plantpush-http-109 Rate limited: {details}")]
    RateLimited { details: String },
}
