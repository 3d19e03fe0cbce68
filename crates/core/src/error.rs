#[allow(clippy::single_component_path_imports)]
use serde_yaml;

#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to store upload: {0}")]
    Store(#[source] flash_files::FilesError),
    #[error("failed to remove superseded temp file '{name}': {source}")]
    OrphanCleanup {
        name: String,
        #[source]
        source: flash_files::FilesError,
    },
    #[error("failed to resolve session directory: {0}")]
    SessionDirResolve(std::io::Error),
    #[error("invalid session directory: {0}")]
    SessionDir(#[source] flash_files::FilesError),
    #[error("failed to clear session directory (path: {path}): {source}", path = path.display())]
    SessionClear {
        path: std::path::PathBuf,
        #[source]
        source: flash_files::FilesError,
    },
    #[error("failed to read session index: {0}")]
    IndexRead(std::io::Error),
    #[error("failed to write session index: {0}")]
    IndexWrite(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("session index schema mismatch at {path}: {source}")]
    YamlDeserialization {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid session id: {0}")]
    Uuid(#[from] flash_uuid::UuidError),
    #[error("invalid text: {0}")]
    Text(#[from] flash_types::TextError),
}

pub type FlashResult<T> = std::result::Result<T, FlashError>;
