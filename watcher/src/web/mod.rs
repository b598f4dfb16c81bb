pub mod server;

pub use server::start_web_server;
