// strato-cli: clap commands and logging for stratoctl

pub mod commands;
pub mod logging;

pub use commands::run;
