pub mod breaker;
pub mod forwarder;
pub mod mock;
pub mod translate;
