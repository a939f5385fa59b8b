//! Shared test fixtures.

pub mod mock_gateway;
