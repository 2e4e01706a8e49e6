//! Pull-based streaming boundary.
//!
//! `ItemStream` repeatedly drives `StreamEngine::turn`, buffering each
//! batch and handing items out one at a time. The caller owns the pace:
//! the inter-poll delay is slept cooperatively inside `next()`, and
//! dropping the stream between turns can never corrupt state because state
//! only advances at successful turn boundaries.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::QueryConfig;
use crate::engine::StreamEngine;
use crate::error::EngineError;
use crate::record::SourceItem;
use crate::state::{Checkpoint, StreamState};

/// Invoked once per turn with the freshly produced checkpoint, for external
/// persistence.
pub type StateCallback = Box<dyn Fn(&Checkpoint) + Send + Sync>;

#[derive(Default)]
pub struct StreamOptions {
    /// Stop after yielding this many items.
    pub max_items: Option<u64>,
    /// Stop after this many engine turns.
    pub max_invocations: Option<u32>,
    pub on_state_change: Option<StateCallback>,
}

pub struct ItemStream {
    engine: StreamEngine,
    query: QueryConfig,
    state: Option<StreamState>,
    opts: StreamOptions,
    buffer: VecDeque<SourceItem>,
    next_poll_ms: Option<u32>,
    emitted: u64,
    invocations: u32,
    finished: bool,
}

impl ItemStream {
    pub fn new(
        engine: StreamEngine,
        query: QueryConfig,
        state: Option<StreamState>,
        opts: StreamOptions,
    ) -> Self {
        Self {
            engine,
            query,
            state,
            opts,
            buffer: VecDeque::new(),
            // First turn runs immediately.
            next_poll_ms: Some(0),
            emitted: 0,
            invocations: 0,
            finished: false,
        }
    }

    /// Pull the next item, driving turns (and sleeping the cooperative
    /// inter-poll delay) as needed. `None` means a configured limit was hit
    /// or the engine signalled termination. An `Err` leaves the stream
    /// usable: state was not advanced, so calling `next()` again retries
    /// the same turn.
    pub async fn next(&mut self) -> Option<Result<SourceItem, EngineError>> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(item) = self.buffer.pop_front() {
                self.emitted += 1;
                if self.opts.max_items.is_some_and(|m| self.emitted >= m) {
                    debug!(emitted = self.emitted, "max_items reached");
                    self.finished = true;
                }
                return Some(Ok(item));
            }
            if self
                .opts
                .max_invocations
                .is_some_and(|m| self.invocations >= m)
            {
                debug!(invocations = self.invocations, "max_invocations reached");
                self.finished = true;
                return None;
            }

            match self.next_poll_ms {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(ms) if ms > 0 => {
                    tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
                }
                _ => {}
            }

            match self.engine.turn(&self.query, self.state.clone()).await {
                Ok(out) => {
                    self.invocations += 1;
                    if let Some(cb) = &self.opts.on_state_change {
                        cb(&Checkpoint::from_state(&out.state, out.next_poll_ms));
                    }
                    self.state = Some(out.state);
                    self.next_poll_ms = out.next_poll_ms;
                    self.buffer.extend(out.items);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Collect up to `limit` items, stopping early on error or exhaustion.
    pub async fn collect_items(&mut self, limit: usize) -> Result<Vec<SourceItem>, EngineError> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.next().await {
                Some(Ok(item)) => out.push(item),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn state(&self) -> Option<&StreamState> {
        self.state.as_ref()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.state
            .as_ref()
            .map(|s| Checkpoint::from_state(s, self.next_poll_ms))
    }

    pub fn into_state(self) -> Option<StreamState> {
        self.state
    }
}
