pub mod admin;
pub mod announcement;
pub mod server;
pub mod social;
pub mod ticket;
