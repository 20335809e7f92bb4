use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("config error: {0}")]
    Config(#[from] gauge_types::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] gauge_store::StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] gauge_registry::RegistryError),

    #[error("coverage error: {0}")]
    Coverage(#[from] gauge_coverage::CoverageError),

    #[error("run error: {0}")]
    Run(#[from] gauge_runs::RunError),
}

pub type SdkResult<T> = Result<T, SdkError>;
