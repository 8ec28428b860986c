//! Cart aggregate, its value objects and the ports the core depends on.

pub mod cart;
pub mod gateway;
pub mod item;
pub mod money;
pub mod ports;
pub mod processor;
pub mod reference;
pub mod session;
pub mod view;
