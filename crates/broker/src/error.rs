/// Errors from talking to the task broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The broker gateway returned a non-2xx status code.
    #[error("Broker API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The broker did not accept the task.
    #[error("Task refused: {0}")]
    Refused(String),
}
