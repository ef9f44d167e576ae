pub mod backend;
pub mod chat;
pub mod config;
pub mod context;
pub mod embed;
pub mod page;
pub mod protocol;
pub mod session;
pub mod terminal;
pub mod tracker;
pub mod widget;

#[cfg(test)]
pub(crate) mod testing;
