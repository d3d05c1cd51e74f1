//! In-memory shared store with the atomicity of the real one.
//!
//! Every operation runs under one mutex, which gives the same per-call
//! atomicity the production store gives its commands and scripts. Expiry uses
//! the Tokio clock so paused-time tests can step past leases.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::ports::{
    AdmissionGate, AdmissionGateError, AdmissionVerdict, KeyValueStore, StoreError,
};
use crate::domain::{
    FlashSaleVoucher, MessageId, OrderIntent, SaleWindow, UserId, VoucherId, WindowPosition,
};

use super::lock_or_recover;

/// Stream the admission gate appends to unless told otherwise.
pub const DEFAULT_STREAM_KEY: &str = "stream.orders";

struct Record {
    value: String,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
pub(super) struct Stream {
    next_seq: u64,
    pub(super) entries: BTreeMap<u64, Vec<(String, String)>>,
    pub(super) groups: HashMap<String, Group>,
}

#[derive(Default)]
pub(super) struct Group {
    pub(super) last_delivered: u64,
    pub(super) pending: BTreeMap<u64, String>,
}

impl Stream {
    fn append(&mut self, fields: Vec<(String, String)>) -> MessageId {
        self.next_seq += 1;
        self.entries.insert(self.next_seq, fields);
        message_id(self.next_seq)
    }
}

pub(super) fn message_id(seq: u64) -> MessageId {
    MessageId::new(format!("{seq}-0"))
}

#[derive(Default)]
pub(super) struct State {
    records: HashMap<String, Record>,
    stock: HashMap<VoucherId, i64>,
    windows: HashMap<VoucherId, SaleWindow>,
    buyers: HashMap<VoucherId, HashSet<UserId>>,
    pub(super) streams: HashMap<String, Stream>,
}

impl State {
    fn live(&mut self, key: &str) -> Option<&Record> {
        let now = Instant::now();
        if self.records.get(key).is_some_and(|record| !record.is_live(now)) {
            self.records.remove(key);
        }
        self.records.get(key)
    }

    fn write(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.records.insert(
            key.to_owned(),
            Record {
                value: value.to_owned(),
                ttl,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }
}

/// Shared-store double implementing [`KeyValueStore`] and [`AdmissionGate`].
pub struct InMemoryStore {
    state: Mutex<State>,
    stream_key: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_stream_key(DEFAULT_STREAM_KEY)
    }

    /// Admission gate appending to `stream_key`.
    pub fn with_stream_key(stream_key: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            stream_key: stream_key.into(),
        }
    }

    /// Stream admitted intents are appended to.
    pub fn stream_key(&self) -> &str {
        self.stream_key.as_str()
    }

    /// Current value at `key`, honouring expiry.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.state().live(key).map(|record| record.value.clone())
    }

    /// TTL `key` was last written with, `None` when it has none or is absent.
    pub fn written_ttl(&self, key: &str) -> Option<Duration> {
        self.state().live(key).and_then(|record| record.ttl)
    }

    /// Write `value` at `key` without a TTL.
    pub fn put(&self, key: &str, value: &str) {
        self.state().write(key, value, None);
    }

    /// Number of entries ever appended to `stream_key`.
    pub fn stream_len(&self, stream_key: &str) -> usize {
        self.state()
            .streams
            .get(stream_key)
            .map_or(0, |stream| stream.entries.len())
    }

    pub(super) fn append_entry(&self, stream_key: &str, fields: Vec<(String, String)>) -> MessageId {
        self.state()
            .streams
            .entry(stream_key.to_owned())
            .or_default()
            .append(fields)
    }

    pub(super) fn state(&self) -> MutexGuard<'_, State> {
        lock_or_recover(&self.state)
    }
}

fn encode(intent: &OrderIntent) -> Vec<(String, String)> {
    intent
        .to_fields()
        .into_iter()
        .map(|(field, value)| (field.to_owned(), value))
        .collect()
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.state().write(key, value, ttl);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.write(key, value, Some(ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.live(key).is_some_and(|record| record.value == expected) {
            state.records.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        let existed = state.live(key).is_some();
        state.records.remove(key);
        Ok(existed)
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut state = self.state();
        let current = match state.live(key) {
            Some(record) => record
                .value
                .parse::<i64>()
                .map_err(|_| StoreError::command("value is not an integer or out of range"))?,
            None => 0,
        };
        let ttl = state.live(key).and_then(|record| record.ttl);
        let next = current + 1;
        state.write(key, &next.to_string(), ttl);
        Ok(next)
    }
}

#[async_trait]
impl AdmissionGate for InMemoryStore {
    async fn publish(&self, voucher: &FlashSaleVoucher) -> Result<(), AdmissionGateError> {
        let mut state = self.state();
        state
            .stock
            .insert(voucher.voucher_id, i64::from(voucher.stock));
        state.windows.insert(voucher.voucher_id, voucher.window);
        Ok(())
    }

    async fn try_admit(&self, intent: &OrderIntent) -> Result<AdmissionVerdict, AdmissionGateError> {
        let mut state = self.state();
        let voucher = intent.voucher_id;

        if let Some(window) = state.windows.get(&voucher) {
            match window.position(intent.created_at) {
                WindowPosition::Before => return Ok(AdmissionVerdict::NotStarted),
                WindowPosition::After => return Ok(AdmissionVerdict::Ended),
                WindowPosition::Open => {}
            }
        }
        let stock = state.stock.get(&voucher).copied().unwrap_or(0);
        if stock <= 0 {
            return Ok(AdmissionVerdict::StockExhausted);
        }
        if state
            .buyers
            .get(&voucher)
            .is_some_and(|buyers| buyers.contains(&intent.user_id))
        {
            return Ok(AdmissionVerdict::DuplicateOrder);
        }

        state.stock.insert(voucher, stock - 1);
        state.buyers.entry(voucher).or_default().insert(intent.user_id);
        state
            .streams
            .entry(self.stream_key.clone())
            .or_default()
            .append(encode(intent));
        Ok(AdmissionVerdict::Admitted)
    }

    async fn remaining_stock(
        &self,
        voucher_id: VoucherId,
    ) -> Result<Option<i64>, AdmissionGateError> {
        Ok(self.state().stock.get(&voucher_id).copied())
    }
}
