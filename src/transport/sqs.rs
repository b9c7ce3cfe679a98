//! Amazon SQS transport backed by `aws-sdk-sqs`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::types::{
    Message as SqsMessage, MessageAttributeValue, MessageSystemAttributeName,
    SendMessageBatchRequestEntry,
};
use aws_sdk_sqs::operation::send_message::SendMessageOutput;
use aws_sdk_sqs::Client as SqsClient;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry_aws_messaging::{SqsMessageAttributesExtractor, SqsMessageAttributesInjector};

use super::QueueTransport;
use crate::error::TransportError;
use crate::message::{
    BatchEntry, BatchEntryResult, Message, MessageAttributes, MessageId, ReceiveRequest,
    SendRequest,
};

pub struct SqsTransport {
    client: SqsClient,
    queue_url: String,
}

impl SqsTransport {
    pub fn new(client: SqsClient, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Builds a client from the AWS environment (region, credentials,
    /// `AWS_ENDPOINT_URL` for local stacks).
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(SqsClient::new(&config), queue_url)
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn send_message(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        let response = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(request.body)
            .set_message_attributes(to_sqs_attributes(&request.attributes))
            .set_message_group_id(request.message_group_id)
            .set_message_deduplication_id(request.deduplication_id)
            .send()
            .await
            .map_err(|e| TransportError::new("SendMessage", e))?;

        sent_message_id(&response)
    }

    async fn send_message_batch(
        &self,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryResult>, TransportError> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                SendMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .message_body(entry.body)
                    .set_message_attributes(to_sqs_attributes(&entry.attributes))
                    .set_message_group_id(entry.message_group_id)
                    .set_message_deduplication_id(entry.deduplication_id)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransportError::new("SendMessageBatch", e))?;

        let response = self
            .client
            .send_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| TransportError::new("SendMessageBatch", e))?;

        let mut results: Vec<BatchEntryResult> = response
            .successful()
            .iter()
            .map(|entry| BatchEntryResult::Sent {
                id: entry.id().to_string(),
                message_id: MessageId(entry.message_id().to_string()),
            })
            .collect();
        results.extend(response.failed().iter().map(|entry| BatchEntryResult::Failed {
            id: entry.id().to_string(),
            code: entry.code().to_string(),
            message: entry.message().map(str::to_string),
            sender_fault: entry.sender_fault(),
        }));

        Ok(results)
    }

    async fn receive_message(&self, request: ReceiveRequest) -> Result<Vec<Message>, TransportError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(request.wait_time_seconds)
            .set_message_attribute_names(Some(request.attribute_names))
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| TransportError::new("ReceiveMessage", e))?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(from_sqs_message)
            .collect())
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), TransportError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| TransportError::new("DeleteMessage", e))?;
        Ok(())
    }
}

fn to_sqs_attributes(
    attributes: &MessageAttributes,
) -> Option<HashMap<String, MessageAttributeValue>> {
    if attributes.is_empty() {
        return None;
    }

    let mut sqs_attributes = HashMap::with_capacity(attributes.len());
    let mut injector = SqsMessageAttributesInjector(&mut sqs_attributes);
    for (key, value) in attributes {
        injector.set(key, value.clone());
    }
    Some(sqs_attributes)
}

fn sent_message_id(response: &SendMessageOutput) -> Result<MessageId, TransportError> {
    response
        .message_id()
        .map(|id| MessageId(id.to_string()))
        .ok_or_else(|| TransportError::new("SendMessage", "response carried no MessageId"))
}

fn from_sqs_attributes(attributes: &HashMap<String, MessageAttributeValue>) -> MessageAttributes {
    let extractor = SqsMessageAttributesExtractor(attributes);
    extractor
        .keys()
        .into_iter()
        .filter_map(|key| extractor.get(key).map(|value| (key.to_string(), value.to_string())))
        .collect()
}

fn from_sqs_message(message: SqsMessage) -> Message {
    let attributes = message
        .message_attributes
        .as_ref()
        .map(from_sqs_attributes)
        .unwrap_or_default();
    let system_attributes = message
        .attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name.as_str().to_string(), value))
        .collect();

    Message {
        id: MessageId(message.message_id.unwrap_or_default()),
        body: message.body.unwrap_or_default(),
        receipt_handle: message.receipt_handle.unwrap_or_default(),
        attributes,
        system_attributes,
    }
}
