//! # Adaptive Locator
//!
//! Keeps finding "the same element" in a web page after its markup has
//! been redesigned, without being told a new selector.
//!
//! The relocation engine itself lives in [`adaptive_locator_core`]. This
//! crate supplies what a runnable tool needs around it: a lenient HTML
//! tree builder, a CSS-subset locator, a durable file store, TOML
//! configuration, and the `aloc` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐
//! │  markup  │──▶│ selector │──▶│ literal hit?  │──yes──▶ elements
//! │ (quick-  │   │  (CSS)   │   └──────┬────────┘
//! │   xml)   │   └──────────┘          │ no
//! └──────────┘                         ▼
//!                ┌────────────┐   ┌──────────┐
//!                │ file_store │──▶│ relocate │──▶ best match ≥ threshold
//!                │  (JSON)    │   │ + score  │    or "no match"
//!                └────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! aloc save page-v1.html ".product-card" --url https://shop.example/
//! aloc locate page-v2.html ".product-card" --url https://shop.example/
//! aloc list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`markup`] | HTML text to element tree |
//! | [`selector`] | CSS-subset literal locator |
//! | [`file_store`] | One JSON file per domain, atomic writes |
//! | [`locate`] | `save` / `locate` commands |
//! | [`fingerprints`] | `list` / `show` / `domains` commands |

pub mod config;
pub mod file_store;
pub mod fingerprints;
pub mod locate;
pub mod markup;
pub mod selector;
