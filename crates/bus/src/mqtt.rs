//! MQTT transport on top of `rumqttc`.
//!
//! The event loop runs on its own task. Every incoming publish is first
//! folded into the entity cache, then handed to the router. On each
//! (re)connect the client re-subscribes, registers the monitor service and
//! marks it `up`; the broker publishes the retained last will (`down`) if
//! the connection drops without a clean disconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twinmon_core::{HealthStatus, MonitorSettings, Registration, Status, Target};

use crate::entity::{Entities, EntityCache};
use crate::error::{Error, Result};
use crate::message::{Message, QoS};
use crate::pubsub::{Handler, PubSub, Router};

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Name the monitor registers itself under.
    pub service_name: String,
    /// The monitor's own service entity.
    pub service: Target,
    /// Topic id of the device the monitor belongs to.
    pub parent: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
    /// Time given to in-flight messages before a clean disconnect.
    pub quiesce: Duration,
}

impl MqttConfig {
    /// Build the connection parameters from monitor settings.
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        let device = Target::new(
            &settings.mqtt.topic_root,
            &settings.mqtt.device_topic_id,
            &settings.mqtt.device_id,
        );
        Self {
            host: settings.mqtt.host.clone(),
            port: settings.mqtt.port,
            service_name: settings.service_name.clone(),
            service: device.service(&settings.service_name),
            parent: settings.mqtt.device_topic_id.clone(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_millis(100),
            quiesce: Duration::from_millis(250),
        }
    }

    /// `<service>#<topic>`, unique per monitor instance.
    pub fn client_id(&self) -> String {
        format!("{}#{}", self.service_name, self.service.topic())
    }

    fn options(&self) -> Result<MqttOptions> {
        let will = serde_json::to_vec(&HealthStatus::down())?;
        let mut options = MqttOptions::new(self.client_id(), &self.host, self.port);
        options
            .set_keep_alive(self.keep_alive)
            .set_clean_session(true)
            .set_last_will(LastWill::new(
                self.service.health_topic(),
                will,
                rumqttc::QoS::AtLeastOnce,
                true,
            ));
        Ok(options)
    }
}

/// MQTT backed [`PubSub`].
pub struct MqttClient {
    config: MqttConfig,
    client: AsyncClient,
    cache: Arc<EntityCache>,
    router: Arc<Router>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttClient {
    /// Connect and wait for the broker to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the broker does not acknowledge the connection
    /// within the connect timeout.
    pub async fn connect(config: MqttConfig) -> Result<Self> {
        let options = config.options()?;
        let (client, eventloop) = AsyncClient::new(options, 64);
        let cache = Arc::new(EntityCache::new(EntityCache::filter_for_root(
            &config.service.root_prefix,
        )));
        let router = Arc::new(Router::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (connected_tx, mut connected_rx) = watch::channel(false);

        info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id(),
            "Connecting to MQTT broker"
        );

        let session = Session {
            config: config.clone(),
            client: client.clone(),
            cache: Arc::clone(&cache),
            router: Arc::clone(&router),
        };
        let task = tokio::spawn(session.run(eventloop, stop_rx, connected_tx));

        let acknowledged = tokio::time::timeout(
            config.connect_timeout,
            connected_rx.wait_for(|connected| *connected),
        )
        .await;
        if !matches!(acknowledged, Ok(Ok(_))) {
            let _ = stop_tx.send(true);
            task.abort();
            return Err(Error::transport(format!(
                "no connection acknowledgement from {}:{} within {:?}",
                config.host, config.port, config.connect_timeout
            )));
        }

        Ok(Self {
            config,
            client,
            cache,
            router,
            stop_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// The monitor's own service entity.
    pub fn service(&self) -> &Target {
        &self.config.service
    }
}

#[async_trait]
impl PubSub for MqttClient {
    async fn entities(&self) -> Result<Entities> {
        Ok(self.cache.snapshot().await)
    }

    async fn publish(&self, message: Message) -> Result<()> {
        let topic = message.topic.clone();
        debug!(topic = %topic, retain = message.retain, "Publishing message");
        let send = self.client.publish(
            message.topic,
            message.qos.into(),
            message.retain,
            message.payload,
        );
        match tokio::time::timeout(self.config.publish_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::publish_failed(topic, e.to_string())),
            Err(_) => Err(Error::publish_failed(topic, "timed out")),
        }
    }

    async fn add_route(&self, filter: &str, handler: Handler) -> Result<()> {
        self.router.add(filter, handler).await;
        self.client
            .subscribe(filter, QoS::AtLeastOnce.into())
            .await
            .map_err(|e| Error::subscribe_failed(filter, e.to_string()))
    }

    async fn disconnect(&self, clean: bool) -> Result<()> {
        if clean {
            info!("Disconnecting from MQTT broker");
            if let Err(e) = self.client.disconnect().await {
                warn!(error = %e, "Could not send disconnect");
            }
            tokio::time::sleep(self.config.quiesce).await;
        } else {
            info!("Dropping MQTT connection without disconnect");
        }

        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.lock().await.take() {
            if clean {
                let _ = task.await;
            } else {
                task.abort();
            }
        }
        Ok(())
    }
}

/// State owned by the event loop task.
struct Session {
    config: MqttConfig,
    client: AsyncClient,
    cache: Arc<EntityCache>,
    router: Arc<Router>,
}

impl Session {
    async fn run(
        self,
        mut eventloop: EventLoop,
        mut stop_rx: watch::Receiver<bool>,
        connected_tx: watch::Sender<bool>,
    ) {
        let session = Arc::new(self);
        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT client connected");
                        let _ = connected_tx.send(true);
                        tokio::spawn(Arc::clone(&session).on_connect());
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = Message::new(
                            publish.topic,
                            publish.qos.into(),
                            publish.retain,
                            publish.payload.to_vec(),
                        );
                        session.cache.apply(&message).await;
                        session.router.dispatch(&message).await;
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("Broker closed the connection");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        debug!("MQTT event loop stopped");
                        break;
                    }
                }
            }
        }
    }

    async fn on_connect(self: Arc<Self>) {
        let mut filters = vec![self.cache.filter().to_string()];
        filters.extend(self.router.filters().await);
        for filter in &filters {
            if let Err(e) = self
                .client
                .subscribe(filter.as_str(), rumqttc::QoS::AtLeastOnce)
                .await
            {
                warn!(filter = %filter, error = %e, "Could not subscribe");
            }
        }

        let registration = Registration::monitor(&self.config.service_name, &self.config.parent);
        let health = HealthStatus::now(Status::Up);
        for (topic, body) in [
            (self.config.service.topic(), serde_json::to_vec(&registration)),
            (self.config.service.health_topic(), serde_json::to_vec(&health)),
        ] {
            let result = match body {
                Ok(payload) => self
                    .client
                    .publish(topic.as_str(), rumqttc::QoS::AtLeastOnce, true, payload)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = result {
                warn!(topic = %topic, error = %e, "Could not publish monitor status");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(value: &impl AsRef<[u8]>) -> Vec<u8> {
        value.as_ref().to_vec()
    }

    #[test]
    fn client_id_combines_service_and_topic() {
        let config = MqttConfig::from_settings(&MonitorSettings::default());
        assert_eq!(
            config.client_id(),
            "tedge-container-monitor#te/device/main/service/tedge-container-monitor"
        );
        assert_eq!(config.parent, "device/main//");
        assert_eq!(config.publish_timeout, Duration::from_millis(100));
    }

    #[test]
    fn last_will_targets_own_health_topic() {
        let config = MqttConfig::from_settings(&MonitorSettings::default());
        let options = config.options();
        assert!(options.is_ok());
        let will = options.ok().and_then(|o| o.last_will());
        assert_eq!(
            will.as_ref().map(|w| bytes(&w.topic)),
            Some(b"te/device/main/service/tedge-container-monitor/status/health".to_vec())
        );
        assert_eq!(
            will.as_ref().map(|w| bytes(&w.message)),
            Some(br#"{"status":"down"}"#.to_vec())
        );
        assert_eq!(will.map(|w| w.retain), Some(true));
    }
}
