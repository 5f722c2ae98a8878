use thiserror::Error;

/// Error type shared by the whole crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("module '{module}' does not provide symbol '{name}'")]
    MissingSymbol { module: String, name: String },

    #[error("exported name has no symbol behind it: {0}")]
    DanglingExport(String),

    #[error("name exported more than once: {0}")]
    DuplicateExport(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown reference function: {0}")]
    UnknownFunction(String),

    #[error("'{0}' is exported but cannot be instantiated as a metric")]
    NotAMetric(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("empty data: {0}")]
    EmptyData(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error")]
    Io(#[source] std::io::Error),

    #[error("JSON error")]
    Json(#[source] serde_json::Error),

    #[error("YAML error")]
    Yaml(#[source] serde_yaml::Error),

    #[error("TOML error")]
    Toml(#[source] toml::de::Error),
}

/// Result alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

/// Checks the shape contract every metric shares: same length, not empty.
pub(crate) fn check_lengths(pred_len: usize, target_len: usize) -> Result<()> {
    if pred_len != target_len {
        return Err(Error::DimensionMismatch(format!(
            "predictions and targets differ in length: {} vs {}",
            pred_len, target_len
        )));
    }

    if target_len == 0 {
        return Err(Error::EmptyData(
            "cannot compute a metric on empty data".to_string(),
        ));
    }

    Ok(())
}
