//! Test doubles for exercising the control loop without a broker

pub mod mocks;
