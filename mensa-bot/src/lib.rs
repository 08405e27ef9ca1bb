pub mod catalog_sync;
pub mod sink;
pub mod sweeper;

pub use catalog_sync::CatalogSynchronizer;
pub use sink::ChannelSink;
pub use sweeper::TimeoutSweeper;
