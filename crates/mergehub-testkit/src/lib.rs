//! # mergehub testkit
//!
//! Testing utilities for mergehub.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a memory-backed hub and peers with fixed actor ids
//! - **Generators**: Proptest strategies for mutations and mutation plans
//! - **Faults**: a store wrapper that fails commits on demand
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use mergehub_testkit::generators::{apply_all, mutations};
//!
//! proptest! {
//!     #[test]
//!     fn save_load_keeps_heads(ops in mutations(20)) {
//!         let mut replica = AutomergeReplica::empty();
//!         apply_all(&mut replica, &ops);
//!         let loaded = AutomergeReplica::load(&replica.save()).unwrap();
//!         prop_assert_eq!(loaded.heads(), replica.heads());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! # async fn example() {
//! use mergehub_testkit::fixtures::HubFixture;
//!
//! let fixture = HubFixture::new().await;
//! let peer = fixture.peer_from_hub(1).await;
//! # }
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;

pub use faults::FlakyStore;
pub use fixtures::{peer, peers, HubFixture};
