pub mod common;
pub mod inspect;
pub mod mount;
pub mod ping;

// Re-export command functions
pub use inspect::{cmd_cat, cmd_ls, cmd_stat};
pub use mount::cmd_mount;
pub use ping::cmd_ping;
