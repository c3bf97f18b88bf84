pub mod credentials;
pub mod process;
