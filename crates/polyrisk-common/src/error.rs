use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported ancestry combination: population={population}, gender={gender}")]
    UnsupportedAncestry { population: String, gender: String },

    #[error("ancestry.population is required in configuration")]
    MissingAncestryConfig,

    #[error("no frequency data available for {ancestry}")]
    NoFrequencyData { ancestry: String },

    #[error("invalid variant ID: {0}")]
    InvalidVariantId(String),

    #[error("invalid PRS model: {0}")]
    InvalidModel(String),

    #[error("invalid reference stats: {0}")]
    InvalidStats(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
