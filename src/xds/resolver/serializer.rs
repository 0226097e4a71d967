/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! A single-worker FIFO callback serializer.
//!
//! Callbacks are closures over a state value owned by the worker task.
//! Running them in submission order on one worker provides mutual exclusion
//! for that state without locks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, watch};

use crate::rt;

type Callback<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Item<S> {
    Callback(Callback<S>),
    Shutdown,
}

/// Handle for scheduling callbacks onto the serializer.  Cheap to clone.
pub(crate) struct CallbackSerializer<S> {
    tx: mpsc::UnboundedSender<Item<S>>,
    cancelled: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

impl<S> Clone for CallbackSerializer<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancelled: self.cancelled.clone(),
            done: self.done.clone(),
        }
    }
}

/// The receiving half; consumed by [`SerializerDriver::run`] to start the
/// worker that owns the state.
pub(crate) struct SerializerDriver<S> {
    rx: mpsc::UnboundedReceiver<Item<S>>,
    done_tx: watch::Sender<bool>,
}

impl<S> CallbackSerializer<S> {
    pub(crate) fn new() -> (CallbackSerializer<S>, SerializerDriver<S>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = watch::channel(false);
        (
            CallbackSerializer {
                tx,
                cancelled,
                done,
            },
            SerializerDriver { rx, done_tx },
        )
    }

    /// Enqueues a callback.  Returns false if the serializer has been
    /// cancelled, in which case the callback will never run.
    pub(crate) fn schedule(&self, callback: impl FnOnce(&mut S) + Send + 'static) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(Item::Callback(Box::new(callback))).is_ok()
    }

    /// Cancels the serializer without waiting.  No further callbacks can be
    /// scheduled; callbacks already enqueued still run, in order, before
    /// the worker tears down.
    pub(crate) fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Item::Shutdown);
        }
    }

    /// Cancels the serializer, then waits for already-scheduled callbacks
    /// to drain and for the worker's teardown to complete.  Idempotent and
    /// safe to call concurrently.
    pub(crate) async fn close(&self) {
        self.cancel();
        let mut done = self.done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl<S: Send + 'static> SerializerDriver<S> {
    /// Spawns the worker task.  The worker runs callbacks in FIFO order
    /// against `state`; on cancellation it drains everything scheduled
    /// before the shutdown marker, then hands the state to `on_close` for
    /// teardown.  Callbacks posted after cancellation never enter the
    /// queue: `schedule` rejects them.
    pub(crate) fn run<F>(mut self, mut state: S, runtime: &dyn rt::Runtime, on_close: F)
    where
        F: FnOnce(S) + Send + 'static,
    {
        runtime.spawn(Box::pin(async move {
            while let Some(item) = self.rx.recv().await {
                match item {
                    Item::Callback(callback) => callback(&mut state),
                    Item::Shutdown => break,
                }
            }
            on_close(state);
            let _ = self.done_tx.send(true);
        }));
    }
}
