pub mod builder;
pub mod cli;
pub mod config;
pub mod db;
pub mod embed;
pub mod graph;
pub mod model;
pub mod parser;
pub mod search;
pub mod tools;
pub mod util;
pub mod watch;
