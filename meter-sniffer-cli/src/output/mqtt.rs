//! MQTT publishing of measurement sets as JSON
//!
//! Publishing is fire-and-forget: `try_publish` only queues the message, and
//! a background thread drives the broker connection. A full queue or a lost
//! broker shows up as a sink failure for that set, nothing is retried.

use anyhow::{Context, Result};
use meter_sniffer_decoder::{DecoderError, MeasurementSet, MeasurementSink};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::thread;
use std::time::Duration;

use crate::config::MqttConfig;

/// Messages queued between the sink and the connection thread
const REQUEST_CAPACITY: usize = 10;

pub struct MqttSink {
    client: Client,
    topic: String,
    qos: QoS,
}

impl MqttSink {
    /// Connect to the broker and start the connection thread
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        thread::Builder::new()
            .name("mqtt-connection".to_string())
            .spawn(move || drive_connection(connection))
            .context("Failed to start MQTT connection thread")?;

        log::info!(
            "MQTT: publishing to {}:{} on topic '{}'",
            config.host,
            config.port,
            config.topic
        );
        Ok(Self {
            client,
            topic: config.topic.clone(),
            qos: qos(config.qos),
        })
    }
}

impl MeasurementSink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn publish(&mut self, set: &MeasurementSet) -> meter_sniffer_decoder::Result<()> {
        let payload = set.to_json().to_string();
        self.client
            .try_publish(self.topic.as_str(), self.qos, false, payload)
            .map_err(|e| DecoderError::SinkError(format!("MQTT publish failed: {}", e)))?;
        log::debug!("Queued measurement set for topic {}", self.topic);
        Ok(())
    }

    fn flush(&mut self) -> meter_sniffer_decoder::Result<()> {
        if let Err(e) = self.client.try_disconnect() {
            log::debug!("MQTT disconnect: {}", e);
        }
        Ok(())
    }
}

/// Poll the broker connection until the client is dropped or disconnects
fn drive_connection(mut connection: Connection) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => log::info!("MQTT: connected"),
            Ok(Event::Incoming(Packet::Disconnect)) | Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                log::debug!("MQTT: disconnected");
                break;
            }
            Ok(event) => log::trace!("MQTT event: {:?}", event),
            Err(e) => {
                log::warn!("MQTT connection error: {}", e);
                thread::sleep(Duration::from_secs(1));
            }
        }
    }
}

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
    }
}
