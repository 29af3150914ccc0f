/// Errors from running a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session parameters: {0}")]
    Params(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The cluster API returned a non-2xx status code.
    #[error("Cluster API error ({status}): {body}")]
    ClusterApi { status: u16, body: String },

    /// The job manager refused a status report.
    #[error("Report rejected ({status}): {body}")]
    Report { status: u16, body: String },
}
