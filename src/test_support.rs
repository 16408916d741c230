//! Test doubles shared by the unit tests

use crate::clock::Clock;
use crate::transport::Transport;
use crate::{BkashError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Mutex::new(Utc::now()))
    }

    pub fn advance(&self, secs: i64) {
        *self.0.lock().unwrap() += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub payload: Option<Value>,
    pub headers: HeaderMap,
}

/// Transport that replays queued responses in order and records every call
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn push(&self, response: Result<Value>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, url: &str, payload: Option<Value>, headers: &HeaderMap) -> Result<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            url: url.to_string(),
            payload,
            headers: headers.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BkashError::transport("no scripted response")))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Value> {
        self.record("GET", url, None, headers)
    }

    async fn post(&self, url: &str, payload: Option<Value>, headers: &HeaderMap) -> Result<Value> {
        self.record("POST", url, payload, headers)
    }
}

/// Successful token endpoint body
pub fn token(id: &str, refresh: &str) -> Result<Value> {
    Ok(json!({
        "id_token": id,
        "refresh_token": refresh,
        "expires_in": 3600,
        "token_type": "Bearer"
    }))
}
