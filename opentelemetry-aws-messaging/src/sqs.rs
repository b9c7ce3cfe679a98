//! SQS message attribute carriers for OpenTelemetry context propagation.
//!
//! [`MessageAttributesInjector`] writes into the attribute map of an outgoing
//! `SendMessage` / `SendMessageBatch` entry, [`MessageAttributesExtractor`]
//! reads from the attributes of a received message.

use aws_sdk_sqs::types::MessageAttributeValue;
use opentelemetry::propagation::{Extractor, Injector};
use std::collections::HashMap;

/// Data type tag attached to every injected attribute.
pub const STRING_DATA_TYPE: &str = "String";

/// An [`Injector`] implementation for SQS message attributes.
///
/// Every value is stored as a `String`-typed attribute. A value the SDK
/// refuses to build is not set.
///
/// # Example
///
/// ```ignore
/// use aws_sdk_sqs::types::MessageAttributeValue;
/// use opentelemetry_aws_messaging::sqs::MessageAttributesInjector;
/// use opentelemetry_aws_messaging::IdPairPropagator;
/// use opentelemetry::propagation::TextMapPropagator;
/// use std::collections::HashMap;
///
/// let mut attributes: HashMap<String, MessageAttributeValue> = HashMap::new();
/// IdPairPropagator::new()
///     .inject_context(&cx, &mut MessageAttributesInjector(&mut attributes));
///
/// client.send_message()
///     .queue_url(&queue_url)
///     .message_body(&body)
///     .set_message_attributes(Some(attributes))
///     .send()
///     .await?;
/// ```
pub struct MessageAttributesInjector<'a>(pub &'a mut HashMap<String, MessageAttributeValue>);

impl Injector for MessageAttributesInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let built = MessageAttributeValue::builder()
            .data_type(STRING_DATA_TYPE)
            .string_value(value)
            .build();
        if let Ok(value) = built {
            self.0.insert(key.to_string(), value);
        }
    }
}

/// An [`Extractor`] implementation for SQS message attributes.
///
/// Only attributes carrying a string value are visible; binary attributes
/// are skipped by both [`Extractor::get`] and [`Extractor::keys`].
pub struct MessageAttributesExtractor<'a>(pub &'a HashMap<String, MessageAttributeValue>);

impl Extractor for MessageAttributesExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.string_value())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, v)| v.string_value().is_some())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}
