pub mod build;
pub mod defines;
pub mod dev_server;
pub mod logging;
