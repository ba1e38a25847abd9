//! Redis key-value store.

use redis::{Client, Connection, FromRedisValue, ToRedisArgs};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::KeyValueStore;
use crate::error::{Error, Result};

/// A [`KeyValueStore`] over one synchronous Redis connection.
///
/// Every trait operation maps to a single Redis command.
pub struct RedisStore {
    con: Mutex<Connection>,
}

impl RedisStore {
    /// Connect to the server at `url` (`redis://host:port/db`).
    pub fn connect(url: &str) -> Result<Self> {
        info!("Connecting to redis at {}", url);
        let client = Client::open(url)?;
        let con = client.get_connection()?;
        Ok(Self {
            con: Mutex::new(con),
        })
    }

    /// Run one command built from `name` and `args`.
    pub(crate) fn query<T: FromRedisValue>(&self, name: &str, args: &[&dyn ToArg]) -> Result<T> {
        let mut cmd = redis::cmd(name);
        for arg in args {
            arg.push_to(&mut cmd);
        }
        let mut con = self.con.lock().unwrap_or_else(|e| e.into_inner());
        debug!(command = name, "redis");
        cmd.query(&mut *con).map_err(Error::from)
    }
}

/// Object-safe argument adapter so commands can take mixed argument types.
pub(crate) trait ToArg {
    fn push_to(&self, cmd: &mut redis::Cmd);
}

impl<T: ToRedisArgs> ToArg for T {
    fn push_to(&self, cmd: &mut redis::Cmd) {
        cmd.arg(self);
    }
}

fn millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by the server
    (ttl.as_millis() as u64).max(1)
}

impl KeyValueStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.query("GET", &[&key])
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        match ttl {
            Some(ttl) => self.query("SET", &[&key, &value, &"PX", &millis(ttl)]),
            None => self.query("SET", &[&key, &value]),
        }
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let reply: Option<String> = match ttl {
            Some(ttl) => self.query("SET", &[&key, &value, &"NX", &"PX", &millis(ttl)])?,
            None => self.query("SET", &[&key, &value, &"NX"])?,
        };
        Ok(reply.is_some())
    }

    fn del(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.query("DEL", &[&key])?;
        Ok(removed > 0)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let found: i64 = self.query("EXISTS", &[&key])?;
        Ok(found > 0)
    }

    fn incr_by(&self, key: &str, by: i64) -> Result<i64> {
        self.query("INCRBY", &[&key, &by])
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let set: i64 = self.query("PEXPIRE", &[&key, &millis(ttl)])?;
        Ok(set == 1)
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        // -2: no such key, -1: no expiry
        let ms: i64 = self.query("PTTL", &[&key])?;
        Ok((ms >= 0).then(|| Duration::from_millis(ms as u64)))
    }

    fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        self.query("RPUSH", &[&key, &value])
    }

    fn lpush(&self, key: &str, value: &str) -> Result<usize> {
        self.query("LPUSH", &[&key, &value])
    }

    fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.query("LPOP", &[&key])
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.query("LRANGE", &[&key, &start, &stop])
    }

    fn llen(&self, key: &str) -> Result<usize> {
        self.query("LLEN", &[&key])
    }

    fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        self.query("LTRIM", &[&key, &start, &stop])
    }

    fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = self.query("SADD", &[&key, &member])?;
        Ok(added == 1)
    }

    fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self.query("SREM", &[&key, &member])?;
        Ok(removed == 1)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut members: Vec<String> = self.query("SMEMBERS", &[&key])?;
        members.sort();
        Ok(members)
    }

    fn scard(&self, key: &str) -> Result<usize> {
        self.query("SCARD", &[&key])
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        let added: i64 = self.query("ZADD", &[&key, &score, &member])?;
        Ok(added == 1)
    }

    fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.query("ZRANGE", &[&key, &start, &stop])
    }

    fn zcard(&self, key: &str) -> Result<usize> {
        self.query("ZCARD", &[&key])
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.query("KEYS", &[&pattern])?;
        keys.sort();
        Ok(keys)
    }
}
