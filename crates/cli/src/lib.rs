pub mod cli;
pub mod commands;
pub mod context;
pub mod logging;
pub mod notify;
pub mod output;
pub mod store;
