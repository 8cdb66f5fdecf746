/// Optional Redis integration (config cache tier, rate-limit counters)

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig, RedisStats};
