#![cfg(test)]

pub mod common;
pub mod lifecycle_tests;
pub mod routing_tests;
pub mod session_tests;
pub mod storage_tests;
