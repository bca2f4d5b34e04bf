pub mod boot;
pub mod cmdline;
pub mod error;
pub mod krbd;
pub mod mount;
pub mod syscall;
pub mod test_utils;
pub mod utils;

pub use error::LibrbdbootError;
