//! Execution sessions: interactive compute endpoints kept alive for the
//! lifetime of a `session` job.
//!
//! A [`SessionRuntime`] provisions the endpoint, reports its address
//! through a [`SessionReporter`] and blocks until the session ends or is
//! cancelled. Two runtimes exist:
//!
//! - [`KubernetesSession`] runs the session as a pod in a cluster;
//! - [`SubprocessSession`] runs it as a local child process.
//!
//! The worker picks one at start up depending on whether it runs inside a
//! cluster.

pub mod error;
pub mod kubernetes;
pub mod network;
pub mod params;
pub mod reporter;
pub mod runtime;
pub mod subprocess;

pub use error::SessionError;
pub use kubernetes::{KubeRestApi, KubernetesSession, PodApi, PodPhase, PodStatus};
pub use params::SessionParams;
pub use reporter::{HttpReporter, SessionReporter};
pub use runtime::SessionRuntime;
pub use subprocess::SubprocessSession;
