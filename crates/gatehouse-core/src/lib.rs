//! # Gatehouse Core
//!
//! Core library for the Gatehouse API edge-security pipeline.
//!
//! This crate provides the transport-agnostic services the HTTP layer
//! composes around business handlers:
//!
//! - **[`limiter`]**: Fixed-window rate limiting with per-key buckets, plus a
//!   distributed variant backed by a shared counter store that degrades
//!   silently to the local algorithm.
//!
//! - **[`idempotency`]**: Seen-key deduplication with per-entry TTLs for
//!   retried mutations, local or backed by the shared store.
//!
//! - **[`auth`]**: Bearer token verification against remote JWKS documents
//!   with per-issuer caching, key-rotation retry, and claim checks.
//!
//! - **[`metrics`]**: Per-route latency/error collection with on-demand
//!   percentile snapshots and Prometheus exposition.
//!
//! - **[`dto`]**: The payload contract ([`Validate`](dto::Validate)) shared
//!   by inbound request bodies and outbound response DTOs.
//!
//! - **[`store`]**: The shared counter store client (Redis) exposing the two
//!   primitives the pipeline needs: increment-with-expiry and
//!   set-if-not-exists-with-expiry.
//!
//! - **[`config`]**: Layered configuration with startup validation.
//!
//! ## Request Flow
//!
//! ```text
//! Incoming Request
//!       │
//!       ▼
//! ┌──────────────────┐
//! │  Timing Wrapper  │  correlation id, CSRF, mutation rate limit
//! └────────┬─────────┘
//!          │ guard rejection ──► error envelope (403 / 429)
//!          ▼
//! ┌──────────────────┐
//! │  Bearer Auth     │  JWKS cache + claim checks (per route)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Payload Parse   │  JSON body → schema validation
//! └────────┬─────────┘
//!          ▼
//!   Business handler ──► DTO guard ──► response + x-request-id
//! ```
//!
//! All per-key state (rate buckets, idempotency entries, JWKS caches,
//! metrics buffers) lives in concurrent maps owned by small service structs
//! that are injected by the server crate; nothing here is a module-level
//! global, and nothing survives a process restart.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod idempotency;
pub mod limiter;
pub mod metrics;
pub mod store;
