pub mod catalog;
pub mod config;
pub mod controller;
pub mod guide;
pub mod history;
pub mod metrics;
pub mod scheduler;
pub mod shutdown;
pub mod supervisor;
pub mod testing;

pub use catalog::{Catalog, CatalogError, CatalogSource, Item, JsonFileCatalog};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, HistoryBackend,
    ReloadPolicy, SanitizedConfig,
};
pub use controller::{
    ControllerError, ControllerStatus, ExitReason, Phase, RetryConfig, RetryController,
    StatusHandle,
};
pub use guide::{GuideError, NowPlaying, ProgramGuide, XmltvGuide};
pub use history::{
    HistoryError, HistoryRecord, HistoryStore, JsonFileHistoryStore, PlayHistory,
    SqliteHistoryStore,
};
pub use scheduler::{Scheduler, Selection, SelectionPolicy};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use supervisor::{
    ActiveTransmission, FfmpegSupervisor, RunResult, RunState, Supervisor, SupervisorError,
    TransmissionRun, TransmitConfig,
};
