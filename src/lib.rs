pub mod commands;
pub mod config;
pub mod parse;
pub mod render;
pub mod tracker;
pub mod web;
