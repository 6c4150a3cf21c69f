pub mod backend;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod demo_feed;
pub mod event_log;
pub mod export;
pub mod keymap;
pub mod pending;
pub mod possession;
pub mod record;
pub mod record_worker;
pub mod roster;
pub mod session;
pub mod video_chunks;
pub mod video_pipeline;
