// src/lib.rs

pub mod catalog;
pub mod config;
pub mod db;
pub mod grouping;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reconstruct;
pub mod repo;
pub mod resolve;
pub mod sheet;
