//! Domain types for candlegrid

pub mod candle;
pub mod granularity;
pub mod interval;

pub use candle::Candle;
pub use granularity::Granularity;
pub use interval::TimeInterval;

/// Symbol type alias
pub type Symbol = String;
