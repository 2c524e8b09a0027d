use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::constants::DEFAULT_FETCH_COUNT;
use crate::error::{Error, ResponseCode, Result};
use crate::polling::LongPollingCallback;
use crate::server::command::{
    Command, FetchTopicMessageAckData, FetchTopicMessageResponse, Header, Payload,
};
use crate::server::handler::{BrokerContext, CommandHandler};
use crate::server::transport::Transport;
use crate::storage::{PullRequest, PullResult};
use crate::types::CommandType;

use super::{ack, authorized_connection, context_of};

/// Pull messages for the transport's consumers.
///
/// A single-topic fetch that finds nothing is parked in the long-polling
/// engine and answered later by [`FetchTopicMessageLongPollCallback`].
/// Multi-topic fetches, and fetches the engine cannot take, are answered
/// immediately.
#[derive(Debug, Default)]
pub struct FetchTopicMessageHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for FetchTopicMessageHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::FETCH_TOPIC_MESSAGE]
    }

    fn inject_context(&mut self, context: &BrokerContext) {
        self.context = Some(context.clone());
    }

    fn is_configured(&self) -> bool {
        self.context.is_some()
    }

    async fn handle(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        let ctx = match context_of(&self.context, &command.header) {
            Ok(ctx) => ctx,
            Err(response) => return response,
        };
        let Payload::FetchTopicMessage(request) = &command.payload else {
            return ack(&command.header, ResponseCode::CnParamError);
        };
        if request.topics.is_empty() {
            return ack(&command.header, ResponseCode::CnParamError);
        }

        let connection =
            match authorized_connection(ctx, transport.as_ref(), &request.app, &command.header) {
                Ok(connection) => connection,
                Err(response) => return response,
            };

        let long_poll = request.topics.len() == 1;
        let timeout = ctx.config.effective_long_poll_timeout(request.long_poll_timeout_ms);

        let mut data = BTreeMap::new();
        for (topic, fetch) in &request.topics {
            let Some(consumer) = ctx.sessions.find_consumer(connection.id(), &request.app, topic)
            else {
                debug!(
                    transport = transport.id(),
                    app = %request.app,
                    topic = %topic,
                    "Fetch for unregistered consumer"
                );
                data.insert(
                    topic.clone(),
                    FetchTopicMessageAckData::from_code(ResponseCode::FwConsumerNotExists),
                );
                continue;
            };

            let pull = PullRequest {
                consumer_id: consumer.id.clone(),
                app: request.app.clone(),
                topic: topic.clone(),
                partition: fetch.partition,
                count: if fetch.count == 0 {
                    DEFAULT_FETCH_COUNT
                } else {
                    fetch.count
                },
                max_bytes: ctx.config.fetch_max_bytes,
                ack_timeout: request.ack_timeout,
            };

            let result = match ctx.store.pull(&pull).await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        transport = transport.id(),
                        consumer_id = %consumer.id,
                        topic = %topic,
                        error = %e,
                        "Fetch failed"
                    );
                    data.insert(
                        topic.clone(),
                        FetchTopicMessageAckData::from_code(e.to_response_code()),
                    );
                    continue;
                }
            };

            if long_poll && result.is_empty() && result.code.is_success() && !timeout.is_zero() {
                let callback = FetchTopicMessageLongPollCallback::new(
                    transport.clone(),
                    command.header,
                    topic.clone(),
                    consumer.id.clone(),
                );
                let parked = ctx
                    .long_polling
                    .register(pull, transport.id(), timeout, Box::new(callback));
                if parked.is_ok() {
                    return None;
                }
                // at capacity: answer now with the empty result
            }
            data.insert(topic.clone(), result.into());
        }

        Some(Command::response_to(
            &command.header,
            FetchTopicMessageResponse { data },
        ))
    }
}

/// Writes the response of a parked fetch.
pub struct FetchTopicMessageLongPollCallback {
    transport: Arc<dyn Transport>,
    request: Header,
    topic: String,
    consumer_id: String,
}

impl FetchTopicMessageLongPollCallback {
    pub fn new(
        transport: Arc<dyn Transport>,
        request: Header,
        topic: String,
        consumer_id: String,
    ) -> Self {
        Self {
            transport,
            request,
            topic,
            consumer_id,
        }
    }

    fn respond(&self, data: FetchTopicMessageAckData) -> Result<()> {
        let response = Command::response_to(
            &self.request,
            FetchTopicMessageResponse::single(self.topic.clone(), data),
        );
        self.transport.acknowledge(&self.request, response)
    }
}

impl LongPollingCallback for FetchTopicMessageLongPollCallback {
    fn on_success(&self, result: PullResult) -> Result<()> {
        self.respond(result.into())
    }

    fn on_expire(&self) -> Result<()> {
        self.respond(FetchTopicMessageAckData::from_code(ResponseCode::Success))
    }

    fn on_exception(&self, error: Error) -> Result<()> {
        error!(
            transport = self.transport.id(),
            client = %self.transport.remote_addr(),
            consumer_id = %self.consumer_id,
            topic = %self.topic,
            error = %error,
            "Long-poll fetch failed"
        );
        self.respond(FetchTopicMessageAckData::from_code(error.to_response_code()))
    }
}
