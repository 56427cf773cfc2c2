// Keyed aggregation + top-N ranking.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::Deserialize;

use crate::models::{AggregateEntry, EntityState, HistoryRecord, IntervalDelta};

/// Anything that carries bytes attributable to an entity.
pub trait Usage {
    fn entity_id(&self) -> &str;
    fn address(&self) -> Option<&str>;
    fn total_bytes(&self) -> u64;
}

impl Usage for IntervalDelta {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
    fn total_bytes(&self) -> u64 {
        self.interval_total()
    }
}

impl Usage for EntityState {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
    fn total_bytes(&self) -> u64 {
        self.cumulative_total()
    }
}

impl Usage for HistoryRecord {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
    fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Built-in grouping key policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Entity id as-is (interface name, connection id).
    Entity,
    /// Source address with the port removed; entity id when no address is known.
    SourceAddress,
}

impl GroupBy {
    /// Grouping for stored rows when no configured policy is available: rows carrying a
    /// source address are connections and group by host, anything else by entity.
    pub fn infer<'a, U, I>(items: I) -> Self
    where
        U: Usage + 'a,
        I: IntoIterator<Item = &'a U>,
    {
        if items.into_iter().any(|item| item.address().is_some()) {
            GroupBy::SourceAddress
        } else {
            GroupBy::Entity
        }
    }

    pub fn key<U: Usage + ?Sized>(&self, item: &U) -> String {
        match self {
            GroupBy::Entity => item.entity_id().to_string(),
            GroupBy::SourceAddress => match item.address() {
                Some(addr) => strip_port(addr).to_string(),
                None => item.entity_id().to_string(),
            },
        }
    }
}

/// Host part of `host:port`, `[v6]:port`. Bare addresses (including unbracketed IPv6)
/// are returned unchanged.
pub fn strip_port(addr: &str) -> &str {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return match sock {
            SocketAddr::V4(_) => addr.rsplit_once(':').map_or(addr, |(host, _)| host),
            SocketAddr::V6(_) => addr
                .rsplit_once("]:")
                .map_or(addr, |(host, _)| host.trim_start_matches('[')),
        };
    }
    match addr.split_once(':') {
        // host:port with a single colon (hostname or malformed IPv4); IPv6 has several
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}

/// Sum bytes per key, descending by total. Equal totals keep the order in which
/// their keys were first seen.
pub fn aggregate<'a, U, I, F>(items: I, key_of: F) -> Vec<AggregateEntry>
where
    U: Usage + 'a,
    I: IntoIterator<Item = &'a U>,
    F: Fn(&U) -> String,
{
    let mut entries: Vec<AggregateEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in items {
        let key = key_of(item);
        let bytes = item.total_bytes();
        match index.get(&key) {
            Some(&i) => {
                entries[i].total_bytes = entries[i].total_bytes.saturating_add(bytes);
            }
            None => {
                index.insert(key.clone(), entries.len());
                entries.push(AggregateEntry {
                    key,
                    total_bytes: bytes,
                });
            }
        }
    }
    // sort_by is stable: ties stay in first-seen order
    entries.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
    entries
}

/// Bounded prefix of a ranking.
pub fn top_n(mut entries: Vec<AggregateEntry>, n: usize) -> Vec<AggregateEntry> {
    entries.truncate(n);
    entries
}
