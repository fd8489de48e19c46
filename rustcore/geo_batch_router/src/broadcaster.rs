//! Broadcaster (C8, `spec.md` §4.8) — fans a job's progress events out to
//! every WebSocket client subscribed to it. Non-blocking: a slow or
//! disconnected client never stalls the dispatcher, which only ever
//! `try_send`s (`spec.md` §4.8, "Delivery is best-effort").

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::model::job::JobEvent;

const CLIENT_CHANNEL_CAPACITY: usize = 64;

pub type ClientId = u64;

pub struct Broadcaster {
    subscribers: DashMap<String, DashMap<ClientId, mpsc::Sender<JobEvent>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self { subscribers: DashMap::new() }
    }

    /// Registers a new client for `job_id` and returns the receiving end
    /// it should drain on its WebSocket write loop.
    pub fn subscribe(&self, job_id: &str, client_id: ClientId) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        self.subscribers.entry(job_id.to_string()).or_default().insert(client_id, tx);
        rx
    }

    pub fn unsubscribe(&self, job_id: &str, client_id: ClientId) {
        if let Some(clients) = self.subscribers.get(job_id) {
            clients.remove(&client_id);
        }
        self.subscribers.remove_if(job_id, |_, clients| clients.is_empty());
    }

    /// Publishes `event` to every client currently subscribed to its job.
    /// A full client channel (the client isn't draining fast enough) drops
    /// the event for that client rather than blocking the dispatcher —
    /// the next progress event supersedes it anyway.
    pub fn publish(&self, event: JobEvent) {
        let Some(clients) = self.subscribers.get(&event.job_id) else { return };
        for client in clients.iter() {
            let _ = client.value().try_send(event.clone());
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::job::{JobEventKind, Progress};

    fn event(job_id: &str) -> JobEvent {
        JobEvent {
            job_id: job_id.to_string(),
            kind: JobEventKind::Progress,
            progress: Some(Progress { total: 10, processed: 1, successful: 1, failed: 0, ..Default::default() }),
            status: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe("job-1", 1);
        broadcaster.publish(event("job-1"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id, "job-1");
    }

    #[tokio::test]
    async fn events_for_other_jobs_are_not_delivered() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe("job-1", 1);
        broadcaster.publish(event("job-2"));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_cleans_up_empty_entries() {
        let broadcaster = Broadcaster::new();
        let _rx = broadcaster.subscribe("job-1", 1);
        broadcaster.unsubscribe("job-1", 1);
        broadcaster.publish(event("job-1"));
        assert!(!broadcaster.subscribers.contains_key("job-1"));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(event("job-nobody-is-watching"));
    }
}
