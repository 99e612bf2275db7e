//! Test utilities for Trailplan integration tests
//!
//! `PlanFixture` wraps a planner over a fixed statistics snapshot and offers
//! helpers for inspecting the produced operator trees.

pub mod plan_fixture;
