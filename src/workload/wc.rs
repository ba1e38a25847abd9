//! Word count: a word stream inputter and a word counting mapper.

use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use crate::worker::{Inputter, MapSink, Mapper};

const WORDS_PER_CHUNK: usize = 10;

/// Lowercased words of `text`. A word is a run of letters, digits and `_`.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
}

/// Scans the string stored at the data reference into chunks of ten words.
pub struct WordStream;

impl Inputter for WordStream {
    fn scan(
        &self,
        store: &dyn KeyValueStore,
        data_ref: &str,
        emit: &mut dyn FnMut(String, Vec<String>) -> Result<()>,
    ) -> Result<()> {
        let text = store
            .get(data_ref)?
            .ok_or_else(|| Error::worker(format!("no data stored at `{}`", data_ref)))?;
        let all: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        for (idx, chunk) in all.chunks(WORDS_PER_CHUNK).enumerate() {
            emit(idx.to_string(), chunk.to_vec())?;
        }
        Ok(())
    }
}

/// Emits `(word, "1")` for every word of every record.
pub struct WordCounter;

impl Mapper for WordCounter {
    fn map(&self, records: &[String], sink: &mut dyn MapSink) -> Result<()> {
        for record in records {
            for word in words(record) {
                sink.emit(&word, "1")?;
            }
        }
        Ok(())
    }
}
