//! IPC command handlers, grouped by domain.

pub mod cart;
pub mod loyalty;
pub mod menu;
pub mod orders;
pub mod runtime;
pub mod settings;
pub mod vouchers;
