//! Cluster engine errors.

use std::time::Duration;

use host::ExecError;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("invalid cluster name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("cluster {0:?} already exists; run `bosun cluster cleanup {0}` or choose another name")]
    NameConflict(String),
    #[error("host port {0} is already in use; stop the process bound to it and retry")]
    PortInUse(u16),
    #[error("cluster provisioner failed: {stderr}")]
    Provisioner { stderr: String },
    #[error("cluster API endpoint did not answer within {0:?}")]
    ApiUnreachable(Duration),
    #[error("cluster operation canceled")]
    Canceled,
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
