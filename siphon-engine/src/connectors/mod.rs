//! Connectors shipped with the engine

pub mod jsonfeed;

pub use jsonfeed::JsonFeedConnector;
