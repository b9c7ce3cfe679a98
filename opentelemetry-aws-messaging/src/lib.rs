//! OpenTelemetry context propagation over SQS message attributes.
//!
//! This crate provides [`Injector`] and [`Extractor`] implementations for SQS
//! message attributes and for plain string attribute maps, plus
//! [`IdPairPropagator`], a propagator that carries a span context as two
//! plain attributes: `traceId` and `spanId`.
//!
//! # Features
//!
//! - `sqs` - Enables the SQS message attribute carriers (enabled by default)
//!
//! # Example
//!
//! ## Attaching the current span to an outbound message
//!
//! ```ignore
//! use opentelemetry::propagation::TextMapPropagator;
//! use opentelemetry::Context;
//! use opentelemetry_aws_messaging::{AttributesInjector, IdPairPropagator};
//! use std::collections::HashMap;
//!
//! let mut attributes = HashMap::new();
//! IdPairPropagator::new()
//!     .inject_context(&Context::current(), &mut AttributesInjector(&mut attributes));
//! // `attributes` now holds "traceId" and "spanId"
//! ```
//!
//! ## Restoring the remote parent on receipt
//!
//! ```ignore
//! use opentelemetry::propagation::TextMapPropagator;
//! use opentelemetry_aws_messaging::{IdPairPropagator, SqsMessageAttributesExtractor};
//!
//! let parent_cx = IdPairPropagator::new()
//!     .extract(&SqsMessageAttributesExtractor(msg.message_attributes().unwrap()));
//! // Use `parent_cx` as the parent of the processing span
//! ```
//!
//! [`Injector`]: opentelemetry::propagation::Injector
//! [`Extractor`]: opentelemetry::propagation::Extractor

pub mod carrier;
pub mod id_pair;

#[cfg(feature = "sqs")]
pub mod sqs;

// Re-exports for convenience
pub use carrier::{AttributesExtractor, AttributesInjector};
pub use id_pair::{IdPairPropagator, SPAN_ID_KEY, TRACE_ID_KEY};

#[cfg(feature = "sqs")]
pub use sqs::MessageAttributesExtractor as SqsMessageAttributesExtractor;

#[cfg(feature = "sqs")]
pub use sqs::MessageAttributesInjector as SqsMessageAttributesInjector;
