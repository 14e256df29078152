pub mod direction;
pub mod signal;

pub use direction::Direction;
pub use signal::{
    AppConfig, AssetConfig, GenerateOutcome, Signal, SignalPatch, SignalStatus, StatsOverview,
    TpLevel,
};
