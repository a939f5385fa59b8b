//! Integration tests for trendbot.
//!
//! These tests run a full batch against a scripted broker bridge:
//! - Handshake and order-id seeding
//! - Series collection, completion and timeout
//! - Signal to order flow, including broker rejections

pub mod common;
