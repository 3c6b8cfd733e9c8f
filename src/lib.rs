pub mod audio;
pub mod config;
pub mod coordinator;
pub mod playlist;
pub mod presence;
pub mod relay;
pub mod schedule;
pub mod sensor;

pub use config::MusicConfig;
pub use coordinator::Coordinator;
pub use presence::{DetectionSample, PresenceFusion};
