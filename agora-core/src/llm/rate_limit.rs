//! Sliding-window request throttling for the LLM client.
//!
//! Quotas are tracked per window (minute/hour/day) plus an optional minimum
//! inter-request delay. `acquire` blocks the caller until a slot is free, so
//! the reasoning loop never has to care about provider limits.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    label: &'static str,
    limit: usize,
    span: Duration,
}

#[derive(Debug, Default)]
struct State {
    queues: Vec<VecDeque<Instant>>,
    last_request: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: Vec<Window>,
    delay: Option<Duration>,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(
        minute: Option<u32>,
        hour: Option<u32>,
        day: Option<u32>,
        delay: Option<Duration>,
    ) -> Self {
        let mut windows = Vec::new();
        for (label, limit, span) in [
            ("minute", minute, Duration::from_secs(60)),
            ("hour", hour, Duration::from_secs(3600)),
            ("day", day, Duration::from_secs(86_400)),
        ] {
            if let Some(limit) = limit {
                if limit > 0 {
                    windows.push(Window {
                        label,
                        limit: limit as usize,
                        span,
                    });
                }
            }
        }
        let state = State {
            queues: windows.iter().map(|_| VecDeque::new()).collect(),
            last_request: None,
        };
        Self {
            windows,
            delay: delay.filter(|d| !d.is_zero()),
            state: Mutex::new(state),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.requests_per_minute,
            config.requests_per_hour,
            config.requests_per_day,
            config.request_delay,
        )
    }

    /// Blocks until a request slot is available, then records the request.
    pub async fn acquire(&self) {
        if self.windows.is_empty() && self.delay.is_none() {
            return;
        }

        loop {
            let (wait_time, reason) = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                let mut window_wait = Duration::ZERO;
                let mut saturated = "";
                for (queue, window) in state.queues.iter_mut().zip(&self.windows) {
                    while queue
                        .front()
                        .is_some_and(|t| now.duration_since(*t) >= window.span)
                    {
                        queue.pop_front();
                    }
                    if queue.len() >= window.limit {
                        if let Some(earliest) = queue.front() {
                            let release = window.span - now.duration_since(*earliest);
                            if release > window_wait {
                                window_wait = release;
                                saturated = window.label;
                            }
                        }
                    }
                }

                let delay_wait = match (self.delay, state.last_request) {
                    (Some(delay), Some(last)) => delay.saturating_sub(now.duration_since(last)),
                    _ => Duration::ZERO,
                };

                let wait_time = window_wait.max(delay_wait);
                if wait_time.is_zero() {
                    for queue in state.queues.iter_mut() {
                        queue.push_back(now);
                    }
                    state.last_request = Some(now);
                    return;
                }

                let reason = if window_wait >= delay_wait {
                    saturated
                } else {
                    "inter-request delay"
                };
                (wait_time, reason)
            };

            tracing::info!(
                wait_ms = wait_time.as_millis() as u64,
                reason,
                "waiting to respect LLM quota"
            );
            tokio::time::sleep(wait_time).await;
        }
    }
}
