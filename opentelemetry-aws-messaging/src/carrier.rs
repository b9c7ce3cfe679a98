//! Carriers over plain `HashMap<String, String>` attribute maps.
//!
//! The carriers `opentelemetry` ships for `HashMap` lowercase every key,
//! which turns `traceId` into `traceid`. Attribute names on a queue are
//! case-sensitive, so these keep keys exactly as given.

use opentelemetry::propagation::{Extractor, Injector};
use std::collections::HashMap;

/// Case-preserving [`Injector`] for string attribute maps.
pub struct AttributesInjector<'a>(pub &'a mut HashMap<String, String>);

impl Injector for AttributesInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Case-preserving [`Extractor`] for string attribute maps.
pub struct AttributesExtractor<'a>(pub &'a HashMap<String, String>);

impl Extractor for AttributesExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}
