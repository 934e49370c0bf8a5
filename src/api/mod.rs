pub mod consumer_api;

pub use consumer_api::{DeltaConsumer, Stores};
