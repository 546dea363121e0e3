// src/lib.rs

//! Auction statistics harvester: crawls court-auction statistics pages into
//! an archive and replays archived runs into a relational store.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod store;
pub mod utils;
