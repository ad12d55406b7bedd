pub mod advise;
pub mod error;
pub mod extract;
pub mod http;
