//! Unit tests for the Infra SDK
//!
//! This module contains tests for various components of the SDK.

pub mod common;

pub mod config_tests;
pub mod sdk_tests;
