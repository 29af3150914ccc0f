//! Parameters of a `session` job.
//!
//! Program arguments may contain placeholders that are filled in once the
//! session's ports and key are known:
//!
//! | Placeholder  | Value                                   |
//! |--------------|-----------------------------------------|
//! | `{protocol}` | `ws` or `http`                          |
//! | `{port}`     | the port the session is reached on      |
//! | `{ports}`    | all bound ports, comma separated        |
//! | `{key}`      | the session key                         |

use std::path::PathBuf;

use jobhub_core::session::SessionProtocol;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SessionError;

/// Container image run by cluster sessions when none is given.
pub const DEFAULT_IMAGE: &str = "stencila/executa";

/// Entry point of the executor CLI on worker hosts.
const EXECUTA_CLI: &str = "/usr/lib/node_modules/@stencila/executa/dist/cli/cli/index.js";

const SERVE_ARGS: [&str; 3] = ["serve", "--debug", "--{protocol}=0.0.0.0:{port}"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    pub protocol: SessionProtocol,
    /// Image of the session container (cluster sessions).
    pub image: String,
    /// Program to run (local sessions). Defaults to the executor CLI.
    pub program: Option<String>,
    /// Arguments, with placeholders. Replaces the default arguments.
    pub args: Option<Vec<String>>,
    /// Working directory of a local session, e.g. a project snapshot.
    pub snapshot_dir: Option<PathBuf>,
    /// Number of local ports to reserve for the session.
    pub ports: u16,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            protocol: SessionProtocol::default(),
            image: DEFAULT_IMAGE.into(),
            program: None,
            args: None,
            snapshot_dir: None,
            ports: 1,
        }
    }
}

impl SessionParams {
    /// Read parameters from a job's `params`. Absent or null params give
    /// the defaults.
    pub fn from_value(value: Option<&Value>) -> Result<Self, SessionError> {
        let params: Self = match value {
            None | Some(Value::Null) => Self::default(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| SessionError::Params(e.to_string()))?,
        };
        if params.ports == 0 {
            return Err(SessionError::Params("ports must be at least 1".into()));
        }
        Ok(params)
    }

    /// Container arguments of a cluster session listening on `port`.
    pub fn cluster_args(&self, port: u16, key: &str) -> Vec<String> {
        let args = match &self.args {
            Some(args) => args.clone(),
            None => std::iter::once("executa")
                .chain(SERVE_ARGS)
                .map(str::to_string)
                .collect(),
        };
        self.render(&args, &[port], key)
    }

    /// Program and arguments of a local session bound to `ports`.
    pub fn local_command(&self, ports: &[u16], key: &str) -> (String, Vec<String>) {
        match (&self.program, &self.args) {
            (Some(program), args) => (
                program.clone(),
                self.render(args.as_deref().unwrap_or_default(), ports, key),
            ),
            (None, Some(args)) => ("node".into(), self.render(args, ports, key)),
            (None, None) => {
                let args: Vec<String> = std::iter::once(EXECUTA_CLI)
                    .chain(SERVE_ARGS)
                    .map(str::to_string)
                    .collect();
                ("node".into(), self.render(&args, ports, key))
            }
        }
    }

    fn render(&self, args: &[String], ports: &[u16], key: &str) -> Vec<String> {
        let port = ports.first().map(u16::to_string).unwrap_or_default();
        let all = ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        args.iter()
            .map(|arg| {
                arg.replace("{protocol}", self.protocol.as_str())
                    .replace("{ports}", &all)
                    .replace("{port}", &port)
                    .replace("{key}", key)
            })
            .collect()
    }
}
