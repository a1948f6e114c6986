//! Memorial order bot: a chat storefront that walks a customer through
//! ordering a printed memorial portrait.

pub mod admin;
pub mod assets;
pub mod bot;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod error;
pub mod order;
pub mod pricing;
pub mod store;
