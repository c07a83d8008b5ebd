#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

// must stay first so the logging macros are visible to every module below
mod fmt;

pub mod batch;
pub mod buffer;
pub mod capture;
pub mod clock;
pub mod config;
pub mod drive;
pub mod engine;
pub mod job;
pub mod lines;
pub mod monitor;

#[cfg(test)]
mod testing;
