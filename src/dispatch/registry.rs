// aegis-push/src/dispatch/registry.rs

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Device storage failed: {0}")]
    Storage(String),

    #[error("Push notification delivery failed: {0}")]
    Delivery(String),
}

/// Storage and delivery backend for registered devices.
///
/// The package pipeline never touches this; only the dispatcher does.
pub trait DeviceRegistry: Send + Sync {
    fn add_device(&self, user_id: &str, device_token: &str) -> Result<(), RegistryError>;

    fn delete_device(&self, user_id: &str, device_token: &str) -> Result<(), RegistryError>;

    /// `None` when the user has no registered device.
    fn device_token(&self, user_id: &str) -> Result<Option<String>, RegistryError>;

    fn send_push_notification(&self, payload: &str, device_token: &str)
    -> Result<(), RegistryError>;

    /// Errors Safari reports to `/v{n}/log`.
    fn process_error_log(&self, entries: &[String]) -> Result<(), RegistryError> {
        for entry in entries {
            warn!(entry = %entry, "Safari reported a push error.");
        }
        Ok(())
    }
}

/// In-process registry. Deliveries are recorded, not sent anywhere.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    devices: RwLock<HashMap<String, String>>,
    outbox: Mutex<Vec<Delivery>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub device_token: String,
    pub payload: String,
}

impl MemoryRegistry {
    pub fn sent(&self) -> Vec<Delivery> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> RegistryError {
    RegistryError::Storage("registry lock poisoned".into())
}

impl DeviceRegistry for MemoryRegistry {
    fn add_device(&self, user_id: &str, device_token: &str) -> Result<(), RegistryError> {
        self.devices
            .write()
            .map_err(poisoned)?
            .insert(user_id.to_string(), device_token.to_string());
        info!(user_id, device_token, "Registered device.");
        Ok(())
    }

    fn delete_device(&self, user_id: &str, device_token: &str) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().map_err(poisoned)?;
        if devices.get(user_id).is_some_and(|token| token == device_token) {
            devices.remove(user_id);
            info!(user_id, device_token, "Removed device.");
        }
        Ok(())
    }

    fn device_token(&self, user_id: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.devices.read().map_err(poisoned)?.get(user_id).cloned())
    }

    fn send_push_notification(
        &self,
        payload: &str,
        device_token: &str,
    ) -> Result<(), RegistryError> {
        self.outbox.lock().map_err(poisoned)?.push(Delivery {
            device_token: device_token.to_string(),
            payload: payload.to_string(),
        });
        info!(device_token, bytes = payload.len(), "Queued push notification.");
        Ok(())
    }
}
