//! Polled worker: the schedule → poll → respond pattern.
//!
//! Anything that might block (disk streaming, plugin worker extensions)
//! never runs inside a tick phase. A recall schedules a job, the worker
//! thread does the blocking part, and the recall polls for the response on
//! a later tick.

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::error::{PluginError, Result};

/// The blocking half of a worker job.
pub trait WorkHandler: Send + 'static {
    fn work(&mut self, payload: Vec<u8>) -> Vec<u8>;
}

impl<F> WorkHandler for F
where
    F: FnMut(Vec<u8>) -> Vec<u8> + Send + 'static,
{
    fn work(&mut self, payload: Vec<u8>) -> Vec<u8> {
        self(payload)
    }
}

/// One worker thread with a schedule queue and a response queue.
pub struct PluginWorker {
    schedule_tx: Option<Sender<Vec<u8>>>,
    response_rx: Receiver<Vec<u8>>,
    handle: Option<JoinHandle<()>>,
}

impl PluginWorker {
    pub fn spawn(mut handler: impl WorkHandler) -> Self {
        let (schedule_tx, schedule_rx) = unbounded::<Vec<u8>>();
        let (response_tx, response_rx) = unbounded();

        let handle = std::thread::Builder::new()
            .name("ostinato-plugin-worker".into())
            .spawn(move || {
                // Exits when the schedule side is dropped.
                while let Ok(payload) = schedule_rx.recv() {
                    let response = handler.work(payload);
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn plugin worker");

        Self {
            schedule_tx: Some(schedule_tx),
            response_rx,
            handle: Some(handle),
        }
    }

    /// Schedule a job. Never blocks; safe from a tick phase.
    pub fn schedule(&self, payload: Vec<u8>) -> Result<()> {
        self.schedule_tx
            .as_ref()
            .ok_or(PluginError::WorkerShutDown)?
            .send(payload)
            .map_err(|_| PluginError::WorkerShutDown)
    }

    /// Poll for one finished response. Never blocks; safe from a tick phase.
    pub fn poll_response(&self) -> Option<Vec<u8>> {
        match self.response_rx.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Jobs answered but not yet polled.
    pub fn pending_responses(&self) -> usize {
        self.response_rx.len()
    }
}

impl Drop for PluginWorker {
    fn drop(&mut self) {
        // Closing the schedule channel lets the thread drain and exit.
        drop(self.schedule_tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_schedule_poll_respond() {
        let worker = PluginWorker::spawn(|payload: Vec<u8>| {
            payload.iter().map(|b| b.wrapping_add(1)).collect()
        });

        worker.schedule(vec![1, 2, 3]).unwrap();

        let mut response = None;
        for _ in 0..100 {
            response = worker.poll_response();
            if response.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(response.unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_poll_is_nonblocking() {
        let worker = PluginWorker::spawn(|payload: Vec<u8>| payload);
        assert!(worker.poll_response().is_none());
        assert_eq!(worker.pending_responses(), 0);
    }

    #[test]
    fn test_responses_in_order() {
        let worker = PluginWorker::spawn(|payload: Vec<u8>| payload);
        worker.schedule(vec![1]).unwrap();
        worker.schedule(vec![2]).unwrap();

        let mut responses = Vec::new();
        while responses.len() < 2 {
            if let Some(r) = worker.poll_response() {
                responses.push(r);
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        assert_eq!(responses, vec![vec![1], vec![2]]);
    }
}
