mod args;
mod types;

pub use args::*;
