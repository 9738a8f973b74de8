pub mod dispatch;
pub mod function;
pub mod handlers;
pub mod models;
