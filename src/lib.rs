pub mod attributes;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod library;
pub mod mix;
pub mod pairing;
pub mod pool;
pub mod processing {
    pub mod compose;
    pub mod layout;
}
pub mod random;
pub mod render;
pub mod tasks {
    pub mod output;
    pub mod slideshow;
}
