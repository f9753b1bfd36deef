//! Channel and pattern subscriptions, and message fan-out.
//!
//! Deliveries are written straight to the subscribers' connections. They never go through the
//! subscribers' command batches.

use bytes::{Bytes, BytesMut};
use regex::bytes::Regex;
use std::collections::{HashMap, HashSet};
use std::str;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec;
use crate::connection::Connection;

/// Whether a subscription names one exact channel or a pattern over channel names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Channel,
    Pattern,
}

impl Kind {
    fn subscribe_label(self) -> &'static str {
        match self {
            Kind::Channel => "subscribe",
            Kind::Pattern => "psubscribe",
        }
    }

    fn unsubscribe_label(self) -> &'static str {
        match self {
            Kind::Channel => "unsubscribe",
            Kind::Pattern => "punsubscribe",
        }
    }
}

/// The process-wide subscription registry. Clones share the same tables.
///
/// `publish` takes a read lock, so publishers run concurrently with each other. Subscribing,
/// unsubscribing and disconnect cleanup take the write lock.
#[derive(Clone, Default)]
pub struct PubSub {
    inner: Arc<RwLock<Registry>>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<Bytes, Subscribers>,
    patterns: HashMap<Bytes, PatternEntry>,
    // What each connection is subscribed to, so that it can be torn down in one go.
    owners: HashMap<Uuid, Owned>,
}

type Subscribers = HashMap<Uuid, Connection>;

struct PatternEntry {
    // `None` when the pattern doesn't compile. Such a pattern never matches.
    matcher: Option<Regex>,
    subscribers: Subscribers,
}

impl PatternEntry {
    fn new(pattern: &[u8]) -> Self {
        let matcher = match str::from_utf8(pattern).map(Regex::new) {
            Ok(Ok(regex)) => Some(regex),
            Ok(Err(err)) => {
                warn!("Invalid subscription pattern: {}", err);
                None
            }
            Err(_) => {
                warn!("Subscription pattern is not valid UTF-8");
                None
            }
        };

        Self {
            matcher,
            subscribers: HashMap::new(),
        }
    }

    fn matches(&self, channel: &[u8]) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|regex| regex.is_match(channel))
    }
}

#[derive(Default)]
struct Owned {
    channels: HashSet<Bytes>,
    patterns: HashSet<Bytes>,
}

impl Owned {
    fn names_mut(&mut self, kind: Kind) -> &mut HashSet<Bytes> {
        match kind {
            Kind::Channel => &mut self.channels,
            Kind::Pattern => &mut self.patterns,
        }
    }

    fn count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

impl Registry {
    fn add(&mut self, conn: &Connection, kind: Kind, name: &Bytes) {
        let subscribers = match kind {
            Kind::Channel => self.channels.entry(name.clone()).or_default(),
            Kind::Pattern => {
                &mut self
                    .patterns
                    .entry(name.clone())
                    .or_insert_with(|| PatternEntry::new(name))
                    .subscribers
            }
        };
        subscribers.insert(conn.id(), conn.clone());

        self.owners
            .entry(conn.id())
            .or_default()
            .names_mut(kind)
            .insert(name.clone());
    }

    /// Drops `id` from the subscribers of `name`. The entry itself only goes away once nobody is
    /// left in it.
    fn remove(&mut self, id: Uuid, kind: Kind, name: &[u8]) {
        match kind {
            Kind::Channel => {
                if let Some(subscribers) = self.channels.get_mut(name) {
                    subscribers.remove(&id);
                    if subscribers.is_empty() {
                        self.channels.remove(name);
                    }
                }
            }
            Kind::Pattern => {
                if let Some(entry) = self.patterns.get_mut(name) {
                    entry.subscribers.remove(&id);
                    if entry.subscribers.is_empty() {
                        self.patterns.remove(name);
                    }
                }
            }
        }
    }
}

impl PubSub {
    pub fn new() -> PubSub {
        PubSub::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes `conn` to every name in `names` and writes one confirmation per name straight to
    /// it: `[subscribe|psubscribe, name, n]`, where `n` counts the names subscribed so far in this
    /// call, starting at 1.
    ///
    /// Returns the number of names. Subscribing twice to the same name is a no-op. A closed
    /// connection is never registered and gets 0.
    pub fn subscribe(&self, conn: &Connection, kind: Kind, names: &[Bytes]) -> usize {
        if conn.is_closed() {
            debug!("Connection {} is closed, not subscribing", conn.id());
            return 0;
        }

        {
            let mut registry = self.write();
            for name in names {
                registry.add(conn, kind, name);
            }
        }

        debug!(
            "Connection {} subscribed to {} {:?} name(s)",
            conn.id(),
            names.len(),
            kind
        );

        let confirmations = names
            .iter()
            .enumerate()
            .map(|(i, name)| confirmation(kind.subscribe_label(), Some(name), i as i64 + 1))
            .collect();
        conn.write_batch(confirmations);

        names.len()
    }

    /// Removes `conn` from each name in `names`, or from every name of that kind it holds when
    /// `names` is empty, and confirms each removal with `[unsubscribe|punsubscribe, name, left]`,
    /// `left` being how many subscriptions of either kind the connection still has.
    ///
    /// Returns the number of subscriptions left.
    pub fn unsubscribe(&self, conn: &Connection, kind: Kind, names: &[Bytes]) -> usize {
        let mut confirmations = Vec::new();
        let left = {
            let mut registry = self.write();

            let mut owned = registry.owners.remove(&conn.id()).unwrap_or_default();
            let targets: Vec<Bytes> = if names.is_empty() {
                owned.names_mut(kind).iter().cloned().collect()
            } else {
                names.to_vec()
            };

            for name in &targets {
                owned.names_mut(kind).remove(name);
                registry.remove(conn.id(), kind, name);
                confirmations.push(confirmation(
                    kind.unsubscribe_label(),
                    Some(name),
                    owned.count() as i64,
                ));
            }

            let left = owned.count();
            if left > 0 {
                registry.owners.insert(conn.id(), owned);
            }
            left
        };

        if confirmations.is_empty() {
            confirmations.push(confirmation(kind.unsubscribe_label(), None, left as i64));
        }
        conn.write_batch(confirmations);

        left
    }

    /// Delivers `message` to every connection subscribed to `channel`, and to every connection
    /// subscribed through a pattern matching it. Patterns are regular expressions searched
    /// anywhere in the channel name.
    ///
    /// Returns the number of deliveries. A connection reached through two patterns counts twice,
    /// a connection that is already gone doesn't count.
    pub fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        let registry = self.read();
        let mut sent = 0;

        if let Some(subscribers) = registry.channels.get(channel) {
            let payload = message_frame(None, channel, message);
            for conn in subscribers.values() {
                if conn.write(payload.clone()) {
                    sent += 1;
                }
            }
        }

        for (pattern, entry) in &registry.patterns {
            if !entry.matches(channel) {
                continue;
            }

            let payload = message_frame(Some(pattern), channel, message);
            for conn in entry.subscribers.values() {
                if conn.write(payload.clone()) {
                    sent += 1;
                }
            }
        }

        trace!(
            "Published to {}, {} deliveries",
            String::from_utf8_lossy(channel),
            sent
        );

        sent
    }

    /// Removes every subscription owned by the connection `id`. Safe to call for a connection
    /// that never subscribed, or twice.
    pub fn on_disconnect(&self, id: Uuid) {
        let mut registry = self.write();

        let Some(owned) = registry.owners.remove(&id) else {
            return;
        };

        for name in &owned.channels {
            registry.remove(id, Kind::Channel, name);
        }
        for name in &owned.patterns {
            registry.remove(id, Kind::Pattern, name);
        }

        debug!(
            "Removed {} subscription(s) of connection {}",
            owned.count(),
            id
        );
    }

    /// Channels with at least one subscriber, optionally filtered by a pattern.
    pub fn channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        let filter = pattern.map(PatternEntry::new);
        self.read()
            .channels
            .keys()
            .filter(|channel| filter.as_ref().map_or(true, |f| f.matches(channel)))
            .cloned()
            .collect()
    }

    /// Number of literal subscribers of `channel`.
    pub fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.read().channels.get(channel).map_or(0, HashMap::len)
    }

    /// Number of distinct patterns with at least one subscriber.
    pub fn pattern_count(&self) -> usize {
        self.read().patterns.len()
    }

    /// Number of subscriptions, of both kinds, held by the connection `id`.
    pub fn subscriptions_of(&self, id: Uuid) -> usize {
        self.read().owners.get(&id).map_or(0, Owned::count)
    }
}

fn confirmation(label: &str, name: Option<&Bytes>, count: i64) -> Bytes {
    let mut dst = BytesMut::new();
    codec::append_array(&mut dst, 3);
    codec::append_bulk_string(&mut dst, label);
    match name {
        Some(name) => codec::append_bulk(&mut dst, name),
        None => codec::append_null(&mut dst),
    }
    codec::append_integer(&mut dst, count);
    dst.freeze()
}

// [message, channel, payload] or [pmessage, pattern, channel, payload]
fn message_frame(pattern: Option<&Bytes>, channel: &[u8], message: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    match pattern {
        Some(pattern) => {
            codec::append_array(&mut dst, 4);
            codec::append_bulk_string(&mut dst, "pmessage");
            codec::append_bulk(&mut dst, pattern);
        }
        None => {
            codec::append_array(&mut dst, 3);
            codec::append_bulk_string(&mut dst, "message");
        }
    }
    codec::append_bulk(&mut dst, channel);
    codec::append_bulk(&mut dst, message);
    dst.freeze()
}
