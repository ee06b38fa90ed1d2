use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use ledgerbox_core::{HealthProbe, ProbeError};

#[derive(Clone, Debug)]
pub enum ProbeReply {
    Status(u16),
    Refused,
}

#[derive(Debug)]
struct Script {
    replies: VecDeque<ProbeReply>,
    fallback: ProbeReply,
    urls: Vec<String>,
}

/// Health probe that replays a fixed script, then repeats a fallback reply
#[derive(Clone, Debug)]
pub struct ScriptedProbe {
    script: Arc<Mutex<Script>>,
    latency: Option<Duration>,
}

impl ScriptedProbe {
    pub fn new(replies: impl IntoIterator<Item = ProbeReply>, fallback: ProbeReply) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into_iter().collect(),
                fallback,
                urls: vec![],
            })),
            latency: None,
        }
    }

    pub fn healthy() -> Self {
        Self::new([], ProbeReply::Status(200))
    }

    /// Refuses connections `warmup` times, then answers 200
    pub fn warming_up(warmup: usize) -> Self {
        Self::new(
            std::iter::repeat(ProbeReply::Refused).take(warmup),
            ProbeReply::Status(200),
        )
    }

    pub fn never_healthy() -> Self {
        Self::new([], ProbeReply::Status(503))
    }

    pub fn refusing() -> Self {
        Self::new([], ProbeReply::Refused)
    }

    /// Every probe takes `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|x| x.into_inner())
    }

    pub fn probed_urls(&self) -> Vec<String> {
        self.lock().urls.clone()
    }

    pub fn attempts(&self) -> usize {
        self.lock().urls.len()
    }

    fn next_reply(&self, url: &str) -> ProbeReply {
        let mut script = self.lock();
        script.urls.push(url.to_string());
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| script.fallback.clone())
    }
}

impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        let reply = self.next_reply(url);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            ProbeReply::Status(status) => Ok(status),
            ProbeReply::Refused => Err(ProbeError::Connect(format!("{url}: connection refused"))),
        }
    }
}
