pub mod cli;
pub mod config;
pub mod core;
pub mod types;
pub mod web;

pub use config::AppConfig;
pub use core::{
    ApiClient, AuthError, ClientError, Credentials, Database, DeliveredIndex, HistoryRecord,
    HistoryRepository, Profile, ProfileRepository, ReferenceData, SearchParams, StatusClassifier,
    SyncEngine, SyncOutcome, SyncReport, TokenManager,
};
