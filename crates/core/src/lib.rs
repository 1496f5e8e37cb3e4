pub mod backend;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod dispatch;
pub mod edit;
pub mod fetch;
pub mod layout;
pub mod reducer;
pub mod sort_filter;
pub mod viewport;
