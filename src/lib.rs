// Playback and watch-progress core shared by the operator CLI in src/main.rs

pub mod config;
pub mod events;
pub mod local;
pub mod modal;
pub mod models;
pub mod player;
pub mod progress;
pub mod safeguards;
pub mod store;

#[cfg(test)]
mod test_utils;
