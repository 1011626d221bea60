pub mod config;
pub mod logging;

pub mod broadcast;
pub mod checksum;
pub mod error;
pub mod fetch;
pub mod request;
pub mod scheduler;
pub mod url_model;

pub use broadcast::{CompletionBroadcast, Subscription};
pub use error::{ReleaseError, SchedulerError, SubmitError, TransferError};
pub use fetch::{FetchHandle, FetchResult, Fetcher, LoadPriority};
pub use request::RequestState;
pub use scheduler::{
    AdmissionPolicy, FetchScheduler, RequestHandle, SchedulerSettings, SchedulerStats,
    SerializedMode,
};
