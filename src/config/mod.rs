mod settings;

pub use settings::{
    DatabaseConfig, DispatchConfig, JobQueueConfig, LogFormat, LoggingConfig, OtelConfig, Settings,
    StorageConfig,
};
