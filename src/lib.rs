pub mod arg_parser;
pub mod capability_table;
pub mod config;
pub mod errors;
pub mod gpu_enumerator;
pub mod library;
pub mod logger;
pub mod monitor;
pub mod nvapi;
pub mod polling_loop;
pub mod resolver;
pub mod sampler;
pub mod sink;

#[cfg(test)]
mod mock_driver;
