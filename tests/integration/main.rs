//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the council website and
//! tempfile for on-disk databases that must survive between runs.

mod common;
mod fetcher_tests;
mod harvest_tests;
