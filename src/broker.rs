//! AMQP transport: publishes runner requests to a durable work queue and
//! exposes the fan-out exchange consumers read results back from.
//!
//! The connection is reconnected with unbounded retry and a capped backoff
//! whenever it drops — mirroring the reconnect loop the teacher's
//! websocket handler runs for its own long-lived connections.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties, ExchangeKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub amqp_url: String,
    pub request_queue: String,
    pub result_exchange: String,
}

/// A reconnecting AMQP client wrapping a single `lapin` connection.
pub struct Broker {
    config: BrokerConfig,
    connection: RwLock<Arc<Connection>>,
}

impl Broker {
    pub async fn connect(config: BrokerConfig) -> Result<Self, BrokerError> {
        let connection = Self::dial(&config.amqp_url).await?;
        Ok(Self {
            config,
            connection: RwLock::new(Arc::new(connection)),
        })
    }

    async fn dial(amqp_url: &str) -> Result<Connection, BrokerError> {
        let mut backoff = Duration::from_millis(200);
        loop {
            match Connection::connect(amqp_url, ConnectionProperties::default()).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::warn!(error = %e, "amqp connection attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_MAX_BACKOFF);
                }
            }
        }
    }

    async fn channel(&self) -> Result<lapin::Channel, BrokerError> {
        {
            let conn = self.connection.read().await;
            if conn.status().connected() {
                return Ok(conn.create_channel().await?);
            }
        }
        let mut conn = self.connection.write().await;
        if !conn.status().connected() {
            tracing::warn!("amqp connection lost, reconnecting");
            *conn = Arc::new(Self::dial(&self.config.amqp_url).await?);
        }
        Ok(conn.create_channel().await?)
    }

    /// Publish one runner request to the durable work queue.
    pub async fn publish_request<T: Serialize + Sync>(&self, request: &T) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .queue_declare(
                &self.config.request_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let payload = serde_json::to_vec(request)?;
        channel
            .basic_publish(
                "",
                &self.config.request_queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    /// Subscribe to the result fan-out exchange, yielding each message's
    /// decoded body. The caller is responsible for acking via the returned
    /// handle once the result has been durably applied.
    pub async fn subscribe_results<T: DeserializeOwned + Send + 'static>(
        &self,
        consumer_tag: &str,
    ) -> Result<impl futures_util::Stream<Item = Result<(T, lapin::message::Delivery), BrokerError>>, BrokerError>
    {
        let channel = self.channel().await?;
        channel
            .exchange_declare(
                &self.config.result_exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                queue.name().as_str(),
                &self.config.result_exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer.map(|delivery| {
            let delivery = delivery?;
            let body: T = serde_json::from_slice(&delivery.data)?;
            Ok((body, delivery))
        }))
    }

    pub async fn ack(&self, delivery: &lapin::message::Delivery) -> Result<(), BrokerError> {
        delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(BrokerError::from)
    }
}
