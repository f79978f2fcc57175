//! In-process [`Relay`] whose replies are scripted per job and attempt.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use courier_dispatch::{MessageJob, Relay, RelayConfig, RelayError, RelayReceipt};
use parking_lot::Mutex;
use tokio::time::Instant;

/// What the relay does for one attempt.
#[derive(Debug, Clone)]
pub enum Reply {
    Accept,
    Fail(String),
    /// Never answers; only a timeout ends the attempt.
    Hang,
    Panic,
}

/// One call to [`MockRelay::send`].
#[derive(Debug, Clone, Copy)]
pub struct Call {
    pub index: usize,
    /// 1-based attempt number for this job.
    pub attempt: u32,
    pub at: Instant,
}

type Script = Box<dyn Fn(usize, u32) -> Reply + Send + Sync>;

pub struct MockRelay {
    script: Script,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl MockRelay {
    /// `script(index, attempt)` decides each reply.
    pub fn new(script: impl Fn(usize, u32) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(|_, _| Reply::Accept)
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_, _| Reply::Fail(message.clone()))
    }

    /// How long each attempt takes before it replies.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, index: usize) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.index == index)
            .copied()
            .collect()
    }
}

#[async_trait]
impl Relay for MockRelay {
    async fn send(
        &self,
        job: &MessageJob,
        _config: &RelayConfig,
    ) -> Result<RelayReceipt, RelayError> {
        let attempt = {
            let mut calls = self.calls.lock();
            let attempt = 1 + calls.iter().filter(|call| call.index == job.index).count();
            let attempt = u32::try_from(attempt).unwrap_or(u32::MAX);
            calls.push(Call {
                index: job.index,
                attempt,
                at: Instant::now(),
            });
            attempt
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match (self.script)(job.index, attempt) {
            Reply::Accept => Ok(RelayReceipt {
                message_id: Some(format!("{}.{attempt}@mock.relay.test", job.index)),
            }),
            Reply::Fail(message) => Err(RelayError::Other(message)),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RelayError::Other("hung relay woke up".to_string()))
            }
            Reply::Panic => panic!("relay exploded on job {}", job.index),
        }
    }
}
