//! # Architecture Port Layer
//!
//! Target-specific tick sources. The portable core (scheduler, transfer
//! engines, debounce) never depends on this module, which is what lets it
//! run under host unit tests.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
