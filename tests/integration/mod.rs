//! Integration test suite for Conductor.
//!
//! These tests drive the orchestrator end to end over an in-memory store
//! (and, for round trips, the file-backed store) with scripted
//! collaborators. No model is ever called.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Planning, readiness, execution and artifact merging
//! - `split_rewire`: Task splitting and dependency rewiring
//! - `recovery`: Restart recovery, schema upgrades and persistence round trips
//! - `self_healing`: Fix tasks created from runtime faults

mod fixtures;

mod self_healing;
mod split_rewire;
