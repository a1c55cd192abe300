//! Domain types for ZoneLab

pub mod candle;
pub mod zone;

pub use candle::{validate_sequence, Candle, CandleError};
pub use zone::{Direction, NestedZoneLink, Zone, ZoneError, ZoneStatus};
