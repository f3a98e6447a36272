#[path = "../support/mod.rs"]
mod support;

mod redis_store;
mod runner;
