pub mod assign;
pub mod completions;
pub mod history;
pub mod init;
pub mod org;
pub mod ticket;
