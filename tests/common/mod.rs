#![allow(dead_code)]

pub mod test_subscriber;
pub mod tester;
