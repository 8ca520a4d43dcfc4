//! RabbitMQ publisher for email tasks.

use async_trait::async_trait;
use chrono::Utc;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};

use crate::{config::RabbitConfig, error::Result, model::NotificationTask};

use super::TaskQueue;

const PERSISTENT: u8 = 2;

/// Publishes JSON tasks to a durable direct exchange bound to a durable queue.
pub struct AmqpQueue {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl AmqpQueue {
    /// Connects and declares the exchange, the queue and their binding.
    pub async fn connect(config: &RabbitConfig) -> Result<Self> {
        let connection =
            Connection::connect(config.url.expose(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(exchange = %config.exchange, queue = %config.queue, "connected to RabbitMQ");

        Ok(Self {
            connection,
            channel,
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
        })
    }

    pub async fn close(self) -> Result<()> {
        self.channel.close(200, "closing").await?;
        self.connection.close(200, "closing").await?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for AmqpQueue {
    async fn publish(&self, task: &NotificationTask) -> Result<()> {
        let body = task.to_json()?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT)
            .with_timestamp(Utc::now().timestamp().max(0) as u64);

        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }
}
