pub mod ast;
pub mod cli;
pub mod error;
pub mod estimator;
pub mod executor;
pub mod generate;
pub mod model;
pub mod parser;
pub mod server;
pub mod store;

pub use error::MiniError;
pub use executor::{ExecOutput, Executor, ExecutorConfig};
pub use store::{RowStore, Store};
