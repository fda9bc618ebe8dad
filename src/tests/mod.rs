//! Test module for staged-router
//!
//! Unit and property-based tests for the routing pipeline: selection,
//! staging, adoption, navigation, gate middleware, and server rendering.

pub mod support;


#[cfg(test)]
pub mod staging_tests;

#[cfg(test)]
pub mod adoption_tests;

#[cfg(test)]
pub mod navigation_tests;
