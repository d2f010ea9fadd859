// src/lib.rs

//! deviantART account monitors and downloaders

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
