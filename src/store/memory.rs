//! In-process key-value store.
//!
//! Each key is a [`DashMap`] entry, so every operation is atomic on its key
//! the same way a single Redis command is. TTLs are checked lazily: an
//! expired entry is dropped by the next operation that touches it.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use glob::Pattern;
use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use super::{resolve_range, KeyValueStore};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    /// Kept sorted by `(score, member)`.
    ZSet(Vec<(f64, String)>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::ZSet(_) => "zset",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Str(_) => false,
        Value::List(list) => list.is_empty(),
        Value::Set(set) => set.is_empty(),
        Value::ZSet(zset) => zset.is_empty(),
    }
}

fn wrong_type(key: &str, found: &Value, wanted: &str) -> Error {
    Error::store(format!(
        "WRONGTYPE key `{}` holds a {}, not a {}",
        key,
        found.type_name(),
        wanted
    ))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge(&self, key: &str) {
        let now = Instant::now();
        self.data.remove_if(key, |_, entry| entry.is_expired(now));
    }

    /// Read-only access to a live value.
    fn read<T>(&self, key: &str, f: impl FnOnce(&Value) -> Result<T>) -> Result<Option<T>> {
        self.purge(key);
        match self.data.get(key) {
            Some(entry) => f(&entry.value).map(Some),
            None => Ok(None),
        }
    }

    /// Mutate a value, creating it with `init` when missing. Collections left
    /// empty are removed, as Redis does.
    fn write<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> Result<T>,
    ) -> Result<T> {
        self.purge(key);
        let out = {
            let mut entry = self
                .data
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(init()));
            f(&mut entry.value)
        };
        self.data.remove_if(key, |_, entry| is_empty(&entry.value));
        out
    }

    /// Mutate an existing value; missing keys yield `None` without creating anything.
    fn modify<T>(&self, key: &str, f: impl FnOnce(&mut Value) -> Result<T>) -> Result<Option<T>> {
        self.purge(key);
        let out = match self.data.get_mut(key) {
            Some(mut entry) => Some(f(&mut entry.value)?),
            None => None,
        };
        self.data.remove_if(key, |_, entry| is_empty(&entry.value));
        Ok(out)
    }

    fn list_mut<'a>(key: &str, value: &'a mut Value) -> Result<&'a mut VecDeque<String>> {
        match value {
            Value::List(list) => Ok(list),
            other => Err(wrong_type(key, other, "list")),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(key, |value| match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(wrong_type(key, other, "string")),
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.data.insert(key.to_string(), entry);
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        self.purge(key);
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(_) => Ok(false),
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                });
                Ok(true)
            }
        }
    }

    fn del(&self, key: &str) -> Result<bool> {
        self.purge(key);
        Ok(self.data.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.purge(key);
        Ok(self.data.contains_key(key))
    }

    fn incr_by(&self, key: &str, by: i64) -> Result<i64> {
        self.write(
            key,
            || Value::Str("0".to_string()),
            |value| match value {
                Value::Str(s) => {
                    let current: i64 = s.parse().map_err(|_| {
                        Error::store(format!("value at `{}` is not an integer", key))
                    })?;
                    let next = current + by;
                    *s = next.to_string();
                    Ok(next)
                }
                other => Err(wrong_type(key, other, "string")),
            },
        )
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.purge(key);
        match self.data.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.purge(key);
        let now = Instant::now();
        Ok(self
            .data
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        self.write(
            key,
            || Value::List(VecDeque::new()),
            |v| {
                let list = Self::list_mut(key, v)?;
                list.push_back(value.to_string());
                Ok(list.len())
            },
        )
    }

    fn lpush(&self, key: &str, value: &str) -> Result<usize> {
        self.write(
            key,
            || Value::List(VecDeque::new()),
            |v| {
                let list = Self::list_mut(key, v)?;
                list.push_front(value.to_string());
                Ok(list.len())
            },
        )
    }

    fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.modify(key, |v| Ok(Self::list_mut(key, v)?.pop_front()))
            .map(Option::flatten)
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let range = self.read(key, |value| match value {
            Value::List(list) => Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            other => Err(wrong_type(key, other, "list")),
        })?;
        Ok(range.unwrap_or_default())
    }

    fn llen(&self, key: &str) -> Result<usize> {
        let len = self.read(key, |value| match value {
            Value::List(list) => Ok(list.len()),
            other => Err(wrong_type(key, other, "list")),
        })?;
        Ok(len.unwrap_or(0))
    }

    fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        self.modify(key, |v| {
            let list = Self::list_mut(key, v)?;
            match resolve_range(list.len(), start, stop) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            }
            Ok(())
        })?;
        Ok(())
    }

    fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.write(
            key,
            || Value::Set(BTreeSet::new()),
            |v| match v {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                other => Err(wrong_type(key, other, "set")),
            },
        )
    }

    fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed = self.modify(key, |v| match v {
            Value::Set(set) => Ok(set.remove(member)),
            other => Err(wrong_type(key, other, "set")),
        })?;
        Ok(removed.unwrap_or(false))
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let members = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.iter().cloned().collect()),
            other => Err(wrong_type(key, other, "set")),
        })?;
        Ok(members.unwrap_or_default())
    }

    fn scard(&self, key: &str) -> Result<usize> {
        let card = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.len()),
            other => Err(wrong_type(key, other, "set")),
        })?;
        Ok(card.unwrap_or(0))
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        self.write(
            key,
            || Value::ZSet(Vec::new()),
            |v| match v {
                Value::ZSet(zset) => {
                    let existing = zset.iter().position(|(_, m)| m == member);
                    let added = existing.is_none();
                    if let Some(idx) = existing {
                        zset.remove(idx);
                    }
                    let at = zset.partition_point(|(s, m)| {
                        s.total_cmp(&score).then_with(|| m.as_str().cmp(member)).is_lt()
                    });
                    zset.insert(at, (score, member.to_string()));
                    Ok(added)
                }
                other => Err(wrong_type(key, other, "zset")),
            },
        )
    }

    fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let range = self.read(key, |value| match value {
            Value::ZSet(zset) => Ok(match resolve_range(zset.len(), start, stop) {
                Some((from, to)) => zset[from..=to].iter().map(|(_, m)| m.clone()).collect(),
                None => Vec::new(),
            }),
            other => Err(wrong_type(key, other, "zset")),
        })?;
        Ok(range.unwrap_or_default())
    }

    fn zcard(&self, key: &str) -> Result<usize> {
        let card = self.read(key, |value| match value {
            Value::ZSet(zset) => Ok(zset.len()),
            other => Err(wrong_type(key, other, "zset")),
        })?;
        Ok(card.unwrap_or(0))
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern).map_err(|e| Error::store(e.to_string()))?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| !entry.is_expired(now) && pattern.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_and_set_nx() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.set_nx("a", "1", None).unwrap());
        assert!(!store.set_nx("a", "2", None).unwrap());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert!(store.del("a").unwrap());
        assert!(!store.del("a").unwrap());
    }

    #[test]
    fn incr_by_starts_at_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by("n", 1).unwrap(), 1);
        assert_eq!(store.incr_by("n", 5).unwrap(), 6);
        store.set("s", "abc", None).unwrap();
        assert!(store.incr_by("s", 1).is_err());
    }

    #[test]
    fn expired_keys_disappear() {
        let store = MemoryStore::new();
        store.set("gone", "x", Some(Duration::ZERO)).unwrap();
        assert_eq!(store.get("gone").unwrap(), None);
        assert!(!store.exists("gone").unwrap());
        // an expired lock can be re-acquired
        assert!(store.set_nx("gone", "y", None).unwrap());
    }

    #[test]
    fn ttl_reports_remaining_time() {
        let store = MemoryStore::new();
        store.set("k", "v", None).unwrap();
        assert_eq!(store.ttl("k").unwrap(), None);
        assert!(store.expire("k", Duration::from_secs(60)).unwrap());
        let left = store.ttl("k").unwrap().unwrap();
        assert!(left <= Duration::from_secs(60) && left > Duration::from_secs(50));
        assert!(!store.expire("missing", Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn lists_behave_like_redis_lists() {
        let store = MemoryStore::new();
        assert_eq!(store.rpush("l", "b").unwrap(), 1);
        assert_eq!(store.rpush("l", "c").unwrap(), 2);
        assert_eq!(store.lpush("l", "a").unwrap(), 3);
        assert_eq!(store.lrange("l", 0, -1).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.lrange("l", 1, 1).unwrap(), vec!["b"]);
        store.ltrim("l", 0, 1).unwrap();
        assert_eq!(store.llen("l").unwrap(), 2);
        assert_eq!(store.lpop("l").unwrap().as_deref(), Some("a"));
        assert_eq!(store.lpop("l").unwrap().as_deref(), Some("b"));
        assert_eq!(store.lpop("l").unwrap(), None);
        // popping the last element removes the key
        assert!(!store.exists("l").unwrap());
    }

    #[test]
    fn sets_deduplicate() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "x").unwrap());
        assert!(!store.sadd("s", "x").unwrap());
        assert!(store.sadd("s", "y").unwrap());
        assert_eq!(store.scard("s").unwrap(), 2);
        assert!(store.srem("s", "x").unwrap());
        assert_eq!(store.smembers("s").unwrap(), vec!["y"]);
    }

    #[test]
    fn sorted_sets_order_by_score_then_member() {
        let store = MemoryStore::new();
        store.zadd("z", 3.0, "c").unwrap();
        store.zadd("z", 1.0, "a").unwrap();
        store.zadd("z", 2.0, "b").unwrap();
        assert!(!store.zadd("z", 0.5, "c").unwrap());
        assert_eq!(store.zrange("z", 0, -1).unwrap(), vec!["c", "a", "b"]);
        assert_eq!(store.zcard("z").unwrap(), 3);
    }

    #[test]
    fn wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.rpush("l", "x").unwrap();
        assert!(store.get("l").is_err());
        assert!(store.sadd("l", "x").is_err());
    }

    #[test]
    fn keys_match_glob_patterns() {
        let store = MemoryStore::new();
        store.set("ns:process:1", "{}", None).unwrap();
        store.rpush("ns:process:1:slaves", "1").unwrap();
        store.set("ns:process:10", "{}", None).unwrap();
        assert_eq!(
            store.keys("ns:process:1:*").unwrap(),
            vec!["ns:process:1:slaves"]
        );
        assert_eq!(store.keys("ns:process:*").unwrap().len(), 3);
    }
}
