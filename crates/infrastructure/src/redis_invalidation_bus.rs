//! Redis Streams transport for permission invalidation events.

mod codec;

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rankguard_application::{
    InvalidationBus, InvalidationMessage, InvalidationPublisher, InvalidationSubscription,
};
use rankguard_core::{AppError, AppResult};
use rankguard_domain::{InvalidationEvent, InvalidationSubject};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, AsyncConnectionConfig};
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use tracing::{debug, warn};

use codec::{PAYLOAD_FIELD, decode_event, encode_event};

/// Stream naming and consumer-group settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisInvalidationBusConfig {
    /// Prefix prepended to each subject to form its stream key.
    pub stream_prefix: String,
    /// Consumer group shared by every engine instance that must see each event once.
    pub group: String,
    /// Consumer name of this instance within the group.
    pub consumer: String,
    /// How long one read blocks waiting for new entries.
    pub block: Duration,
    /// Client-side limit for one read reply; must exceed `block`.
    pub read_timeout: Duration,
    /// Entries fetched per read.
    pub batch_size: usize,
    /// Approximate stream length kept by publishers.
    pub max_len: usize,
}

impl Default for RedisInvalidationBusConfig {
    fn default() -> Self {
        Self {
            stream_prefix: String::new(),
            group: "rankguard".to_owned(),
            consumer: format!("engine-{}", std::process::id()),
            block: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            batch_size: 32,
            max_len: 10_000,
        }
    }
}

impl RedisInvalidationBusConfig {
    /// Rejects settings under which a blocking read could outlive its reply timeout.
    pub fn validate(&self) -> AppResult<()> {
        if self.block.is_zero() {
            return Err(AppError::Validation(
                "invalidation bus block duration must be greater than zero".to_owned(),
            ));
        }

        if self.read_timeout <= self.block {
            return Err(AppError::Validation(format!(
                "invalidation bus read timeout ({}ms) must exceed the block duration ({}ms)",
                self.read_timeout.as_millis(),
                self.block.as_millis()
            )));
        }

        Ok(())
    }

    fn stream_key(&self, subject: InvalidationSubject) -> String {
        format!("{}{}", self.stream_prefix, subject.as_str())
    }
}

/// Invalidation bus backed by one Redis stream per subject.
#[derive(Clone)]
pub struct RedisInvalidationBus {
    client: redis::Client,
    config: RedisInvalidationBusConfig,
}

impl RedisInvalidationBus {
    /// Creates a bus with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client, config: RedisInvalidationBusConfig) -> Self {
        Self { client, config }
    }

    async fn connect(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }

    /// Opens the connection owned by one subscription.
    ///
    /// Its reply timeout covers a full `BLOCK` period; a reply dropped on the client
    /// side would leave the delivered entry pending on the server.
    async fn connect_reader(&self) -> AppResult<MultiplexedConnection> {
        let connection_config =
            AsyncConnectionConfig::new().set_response_timeout(Some(self.config.read_timeout));

        self.client
            .get_multiplexed_async_connection_with_config(&connection_config)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl InvalidationBus for RedisInvalidationBus {
    async fn subscribe(&self) -> AppResult<Box<dyn InvalidationSubscription>> {
        self.config.validate()?;
        let mut connection = self.connect_reader().await?;
        let mut streams = Vec::new();

        for subject in InvalidationSubject::all() {
            let key = self.config.stream_key(*subject);
            let created: redis::RedisResult<()> = connection
                .xgroup_create_mkstream(key.as_str(), self.config.group.as_str(), "$")
                .await;

            if let Err(error) = created
                && error.code() != Some("BUSYGROUP")
            {
                return Err(AppError::Unavailable(format!(
                    "failed to create consumer group '{}' on '{key}': {error}",
                    self.config.group
                )));
            }
            streams.push((key, *subject));
        }

        debug!(
            group = %self.config.group,
            consumer = %self.config.consumer,
            streams = streams.len(),
            "joined invalidation consumer group"
        );

        Ok(Box::new(RedisInvalidationSubscription {
            connection,
            streams,
            group: self.config.group.clone(),
            consumer: self.config.consumer.clone(),
            block: self.config.block,
            batch_size: self.config.batch_size.max(1),
            backlog_drained: false,
            buffered: VecDeque::new(),
        }))
    }
}

#[async_trait]
impl InvalidationPublisher for RedisInvalidationBus {
    async fn publish(&self, event: &InvalidationEvent) -> AppResult<()> {
        let key = self.config.stream_key(event.subject());
        let payload = encode_event(event)?;
        let mut connection = self.connect().await?;

        let entry_id: String = connection
            .xadd_maxlen(
                key.as_str(),
                StreamMaxlen::Approx(self.config.max_len),
                "*",
                &[(PAYLOAD_FIELD, payload.as_str())],
            )
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to publish to '{key}': {error}"))
            })?;

        debug!(stream = %key, entry_id = %entry_id, "invalidation event published");
        Ok(())
    }
}

/// Consumer-group reader over every invalidation stream.
///
/// Entries this consumer received before a restart or a failed read but never
/// acknowledged are redelivered first.
struct RedisInvalidationSubscription {
    connection: MultiplexedConnection,
    streams: Vec<(String, InvalidationSubject)>,
    group: String,
    consumer: String,
    block: Duration,
    batch_size: usize,
    backlog_drained: bool,
    buffered: VecDeque<InvalidationMessage>,
}

impl RedisInvalidationSubscription {
    fn stream_key(&self, subject: InvalidationSubject) -> Option<&str> {
        self.streams
            .iter()
            .find(|(_, candidate)| *candidate == subject)
            .map(|(key, _)| key.as_str())
    }

    fn subject_of(&self, key: &str) -> Option<InvalidationSubject> {
        self.streams
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, subject)| *subject)
    }

    async fn read_batch(&mut self) -> AppResult<()> {
        let keys: Vec<&str> = self.streams.iter().map(|(key, _)| key.as_str()).collect();
        let start = if self.backlog_drained { ">" } else { "0" };
        let ids = vec![start; keys.len()];

        let mut options = StreamReadOptions::default()
            .group(self.group.as_str(), self.consumer.as_str())
            .count(self.batch_size);
        if self.backlog_drained {
            let block_ms = usize::try_from(self.block.as_millis()).unwrap_or(usize::MAX);
            options = options.block(block_ms);
        }

        let read: redis::RedisResult<Option<StreamReadReply>> = self
            .connection
            .xread_options(&keys, &ids, &options)
            .await;
        let reply = match read {
            Ok(reply) => reply.unwrap_or_default(),
            Err(error) => {
                return Err(AppError::Unavailable(format!(
                    "failed to read invalidation streams: {error}"
                )));
            }
        };

        let mut received = 0_usize;
        let mut malformed = Vec::new();
        for stream in reply.keys {
            let Some(subject) = self.subject_of(stream.key.as_str()) else {
                continue;
            };

            for entry in stream.ids {
                received += 1;
                let payload: Option<String> = entry.get(PAYLOAD_FIELD);
                let decoded = match payload {
                    Some(payload) => decode_event(subject, payload.as_str()),
                    None => Err(AppError::Validation(format!(
                        "entry on '{}' has no '{PAYLOAD_FIELD}' field",
                        stream.key
                    ))),
                };

                match decoded {
                    Ok(event) => self.buffered.push_back(InvalidationMessage {
                        delivery_id: entry.id,
                        event,
                    }),
                    Err(error) => {
                        warn!(
                            stream = %stream.key,
                            entry_id = %entry.id,
                            error = %error,
                            "dropping malformed invalidation entry"
                        );
                        malformed.push((stream.key.clone(), entry.id));
                    }
                }
            }
        }

        for (key, entry_id) in malformed {
            self.ack(key.as_str(), entry_id.as_str()).await?;
        }

        if !self.backlog_drained && received == 0 {
            self.backlog_drained = true;
        }

        Ok(())
    }

    async fn ack(&mut self, key: &str, entry_id: &str) -> AppResult<()> {
        let _: i64 = self
            .connection
            .xack(key, self.group.as_str(), &[entry_id])
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to acknowledge '{entry_id}' on '{key}': {error}"
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl InvalidationSubscription for RedisInvalidationSubscription {
    async fn next_message(&mut self) -> AppResult<Option<InvalidationMessage>> {
        loop {
            if let Some(message) = self.buffered.pop_front() {
                return Ok(Some(message));
            }
            self.read_batch().await?;
        }
    }

    async fn acknowledge(&mut self, message: &InvalidationMessage) -> AppResult<()> {
        let Some(key) = self
            .stream_key(message.event.subject())
            .map(str::to_owned)
        else {
            return Err(AppError::Internal(format!(
                "no stream registered for '{}'",
                message.event.subject().as_str()
            )));
        };

        self.ack(key.as_str(), message.delivery_id.as_str()).await
    }
}
