pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod fragment;
pub mod output;
pub mod page;
pub mod query;
pub mod source;

#[cfg(test)]
mod tests;
