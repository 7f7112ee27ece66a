//! Test helper utilities: a scriptable remover and polling helpers

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use watermark_remover::models::job::ImagePayload;
use watermark_remover::services::ingest::RawFile;
use watermark_remover::services::removal::{RemovalError, WatermarkRemover};

pub const CLEAN_SUFFIX: &[u8] = b"|clean";

/// Remover whose behaviour tests control.
///
/// By default it succeeds and returns the input with [`CLEAN_SUFFIX`]
/// appended, so outputs show which payload was fed in.
#[derive(Default)]
pub struct ScriptedRemover {
    fixed_output: Option<Bytes>,
    failing_inputs: Mutex<HashSet<Vec<u8>>>,
    fail_all: Mutex<bool>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<Bytes>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRemover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `output`.
    pub fn returning(output: impl Into<Bytes>) -> Self {
        Self {
            fixed_output: Some(output.into()),
            ..Self::default()
        }
    }

    /// Hold every call until the semaphore hands out a permit.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_for(&self, input: &[u8]) {
        self.failing_inputs.lock().unwrap().insert(input.to_vec());
    }

    pub fn fail_everything(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    /// Stop failing for any input.
    pub fn heal(&self) {
        self.failing_inputs.lock().unwrap().clear();
        self.fail_everything(false);
    }

    /// Inputs seen so far, in call order.
    pub fn calls(&self) -> Vec<Bytes> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatermarkRemover for ScriptedRemover {
    async fn remove_watermark(&self, image: &ImagePayload) -> Result<Bytes, RemovalError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(image.bytes().clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail = *self.fail_all.lock().unwrap()
            || self
                .failing_inputs
                .lock()
                .unwrap()
                .contains(&image.bytes()[..]);
        if fail {
            return Err(RemovalError::Other("scripted failure".to_string()));
        }

        Ok(match &self.fixed_output {
            Some(output) => output.clone(),
            None => Bytes::from([&image.bytes()[..], CLEAN_SUFFIX].concat()),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Expected output of the default remover for `input`.
pub fn cleaned(input: &[u8]) -> Vec<u8> {
    [input, CLEAN_SUFFIX].concat()
}

pub fn raw(name: &str, bytes: Bytes) -> RawFile {
    RawFile::from_bytes(name, Some("image/png".to_string()), bytes)
}

/// Poll `cond` until it holds, panicking after a few seconds.
pub async fn wait_until<F>(what: &str, cond: F)
where
    F: Fn() -> bool,
{
    let polled = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), polled).await.is_err() {
        panic!("timed out waiting for {what}");
    }
}

/// Run `fut` with a timeout so a stuck queue fails the test instead of hanging.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation timed out")
}
