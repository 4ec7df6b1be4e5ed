// Scripted transport for handler and engine tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::model::RemoteEntity;
use crate::remote::{EntityKind, FeedHandle, PollResponse, RemoteTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Subscribe,
    Poll(String),
    Unsubscribe(String),
    Command(String),
}

#[derive(Default)]
pub(crate) struct FakeRemote {
    entities: HashMap<EntityKind, Vec<RemoteEntity>>,
    failing: HashSet<EntityKind>,
    reject_commands: bool,
    hang_polls: bool,
    subscribe_script: Mutex<VecDeque<Result<FeedHandle, TransportError>>>,
    poll_script: Mutex<VecDeque<Result<PollResponse, TransportError>>>,
    subscriptions: AtomicUsize,
    calls: Mutex<Vec<(Instant, Call)>>,
    lookups: Mutex<Vec<String>>,
    commands: Mutex<Vec<(String, Value)>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_entities(mut self, kind: EntityKind, entities: Vec<RemoteEntity>) -> Self {
        self.entities.insert(kind, entities);
        self
    }

    pub(crate) fn failing_fetch(mut self, kind: EntityKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub(crate) fn rejecting_commands(mut self) -> Self {
        self.reject_commands = true;
        self
    }

    /// Unscripted polls never answer, like a hub that drops the response.
    pub(crate) fn hanging_polls(mut self) -> Self {
        self.hang_polls = true;
        self
    }

    pub(crate) fn with_subscribe_results(
        self,
        results: Vec<Result<FeedHandle, TransportError>>,
    ) -> Self {
        self.subscribe_script.lock().unwrap().extend(results);
        self
    }

    /// Poll answers in order. Once exhausted, polls idle for their full
    /// wait and return an empty batch.
    pub(crate) fn with_poll_results(
        self,
        results: Vec<Result<PollResponse, TransportError>>,
    ) -> Self {
        self.poll_script.lock().unwrap().extend(results);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

#[async_trait]
impl RemoteTransport for FakeRemote {
    async fn fetch_entities(&self, kind: EntityKind) -> Result<Vec<RemoteEntity>, TransportError> {
        if self.failing.contains(&kind) {
            return Err(TransportError::Other("connection refused".into()));
        }
        Ok(self.entities.get(&kind).cloned().unwrap_or_default())
    }

    async fn fetch_attribute_state(&self, path: &str) -> Result<RemoteEntity, TransportError> {
        self.lookups.lock().unwrap().push(path.to_owned());
        self.entities
            .get(&EntityKind::DeviceServices)
            .and_then(|services| services.iter().find(|s| s.path() == Some(path)))
            .cloned()
            .ok_or(TransportError::Status {
                status: 404,
                body: String::new(),
            })
    }

    async fn send_command(&self, path: &str, delta: Value) -> Result<(), TransportError> {
        self.record(Call::Command(path.to_owned()));
        self.commands.lock().unwrap().push((path.to_owned(), delta));
        if self.reject_commands {
            return Err(TransportError::Status {
                status: 400,
                body: "invalid state".into(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<FeedHandle, TransportError> {
        self.record(Call::Subscribe);
        let scripted = self.subscribe_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.subscriptions.fetch_add(1, Ordering::SeqCst);
            Ok(FeedHandle::new(format!("sub-{n}")))
        })
    }

    async fn long_poll(
        &self,
        handle: &FeedHandle,
        wait: Duration,
        _grace: Duration,
    ) -> Result<PollResponse, TransportError> {
        self.record(Call::Poll(handle.as_str().to_owned()));
        let scripted = self.poll_script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None if self.hang_polls => std::future::pending().await,
            None => {
                tokio::time::sleep(wait).await;
                Ok(PollResponse::ok(Vec::new()))
            }
        }
    }

    async fn unsubscribe(&self, handle: &FeedHandle) -> Result<(), TransportError> {
        self.record(Call::Unsubscribe(handle.as_str().to_owned()));
        Ok(())
    }
}
