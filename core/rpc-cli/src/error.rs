use simplerpc_core::{ConfigError, ConnectionError, RpcError, SupervisorError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Rpc(err.into())
    }
}

impl From<ConnectionError> for CliError {
    fn from(err: ConnectionError) -> Self {
        CliError::Rpc(err.into())
    }
}

impl From<SupervisorError> for CliError {
    fn from(err: SupervisorError) -> Self {
        CliError::Rpc(err.into())
    }
}
