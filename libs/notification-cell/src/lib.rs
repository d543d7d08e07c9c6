pub mod dispatch;
pub mod models;
