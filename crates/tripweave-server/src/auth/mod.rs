pub mod middleware;
pub mod signature;
pub mod webhook;
