#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("invalid spawn recipe: {0}")]
    InvalidRecipe(String),

    #[error("failed to open pty: {0}")]
    PtyOpenFailed(String),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("push channel not connected")]
    NotConnected,

    #[error("push delivery failed: {0}")]
    DeliveryFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("snapshot missing field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("failed to parse settings: {0}")]
    ParseError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("process not started")]
    NotStarted,

    #[error("{0}")]
    Other(String),
}
