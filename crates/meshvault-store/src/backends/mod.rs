//! Backend implementations of the store contracts

pub mod memory;
