mod basic;
mod shell;

pub use basic::{EchoExecutor, SleepExecutor};
pub use shell::{ProcessTable, ShellExecutor, StopProcessExecutor};
