use std::{collections::HashMap, hash::Hash};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    client::{ApiClient, ApiError},
    protocol::{Application, Attempt, Endpoint, EndpointStats, EventType, Message},
};

/// Which list of attempts is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttemptScope {
    Endpoint { app_id: String, endpoint_id: String },
    Message { app_id: String, msg_id: String },
}

/// Which list of messages is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageScope {
    App { app_id: String },
    Endpoint { app_id: String, endpoint_id: String },
}

#[derive(Debug, Clone)]
pub struct EndpointEntry {
    pub endpoint: Endpoint,
    pub stats: Option<EndpointStats>,
}

/// Lists keyed by the scope they were loaded for. Each load only touches
/// its own slot, so a late response for a screen the user already left
/// neither shows up on nor replaces the current one.
#[derive(Debug)]
struct Cached<K, T> {
    slots: HashMap<K, Vec<T>>,
}

impl<K, T> Default for Cached<K, T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, T: Clone> Cached<K, T> {
    fn store(&mut self, key: K, items: Vec<T>) {
        self.slots.insert(key, items);
    }

    fn get(&self, key: &K) -> Vec<T> {
        self.slots.get(key).cloned().unwrap_or_default()
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut Vec<T>> {
        self.slots.get_mut(key)
    }
}

#[derive(Debug, Default)]
struct StateInner {
    applications: Vec<Application>,
    endpoints: Cached<String, EndpointEntry>,
    messages: Cached<MessageScope, Message>,
    attempts: Cached<AttemptScope, Attempt>,
    event_types: Vec<EventType>,
    last_error: Option<String>,
}

/// Shared cache of everything the dashboard has fetched. Loads never fail:
/// a failed request leaves an empty list and records the error for display.
#[derive(Debug)]
pub struct AppState {
    client: ApiClient,
    inner: RwLock<StateInner>,
}

impl AppState {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            inner: RwLock::new(StateInner::default()),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn refresh_applications(&self) {
        let applications = self
            .fallback("applications", self.client.list_applications().await)
            .await;
        self.inner.write().await.applications = applications;
    }

    pub async fn refresh_endpoints(&self, app_id: &str) {
        let endpoints = self
            .fallback("endpoints", self.client.list_endpoints(app_id).await)
            .await;

        let mut entries = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let stats = match self.client.endpoint_stats(app_id, &endpoint.id).await {
                Ok(stats) => Some(stats),
                Err(err) => {
                    debug!(endpoint = %endpoint.id, %err, "endpoint stats unavailable");
                    None
                }
            };
            entries.push(EndpointEntry { endpoint, stats });
        }

        self.inner
            .write()
            .await
            .endpoints
            .store(app_id.to_string(), entries);
    }

    pub async fn refresh_messages(&self, scope: &MessageScope) {
        let result = match scope {
            MessageScope::App { app_id } => self.client.list_messages(app_id).await,
            MessageScope::Endpoint {
                app_id,
                endpoint_id,
            } => self.client.messages_by_endpoint(app_id, endpoint_id).await,
        };
        let messages = self.fallback("messages", result).await;
        self.inner.write().await.messages.store(scope.clone(), messages);
    }

    pub async fn refresh_attempts(&self, scope: &AttemptScope) {
        let result = match scope {
            AttemptScope::Endpoint {
                app_id,
                endpoint_id,
            } => self.client.attempts_by_endpoint(app_id, endpoint_id).await,
            AttemptScope::Message { app_id, msg_id } => {
                self.client.attempts_by_message(app_id, msg_id).await
            }
        };
        let attempts = self.fallback("attempts", result).await;
        self.inner.write().await.attempts.store(scope.clone(), attempts);
    }

    pub async fn refresh_event_types(&self) {
        let event_types = self
            .fallback("event types", self.client.list_event_types().await)
            .await;
        self.inner.write().await.event_types = event_types;
    }

    pub async fn applications(&self) -> Vec<Application> {
        self.inner.read().await.applications.clone()
    }

    pub async fn endpoints(&self, app_id: &str) -> Vec<EndpointEntry> {
        self.inner.read().await.endpoints.get(&app_id.to_string())
    }

    pub async fn messages(&self, scope: &MessageScope) -> Vec<Message> {
        self.inner.read().await.messages.get(scope)
    }

    pub async fn attempts(&self, scope: &AttemptScope) -> Vec<Attempt> {
        self.inner.read().await.attempts.get(scope)
    }

    pub async fn event_types(&self) -> Vec<EventType> {
        self.inner.read().await.event_types.clone()
    }

    /// Replaces a cached endpoint after it was updated server-side.
    pub async fn replace_endpoint(&self, app_id: &str, endpoint: Endpoint) {
        let mut inner = self.inner.write().await;
        let Some(entries) = inner.endpoints.get_mut(&app_id.to_string()) else {
            return;
        };
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.endpoint.id == endpoint.id)
        {
            entry.endpoint = endpoint;
        }
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.read().await.last_error.clone()
    }

    pub async fn clear_error(&self) {
        self.inner.write().await.last_error = None;
    }

    async fn fallback<T>(&self, what: &str, result: Result<Vec<T>, ApiError>) -> Vec<T> {
        match result {
            Ok(items) => items,
            Err(err) => {
                warn!(%err, "failed to load {}", what);
                self.inner.write().await.last_error =
                    Some(format!("Failed to load {}: {}", what, err));
                Vec::new()
            }
        }
    }
}
