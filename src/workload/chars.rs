//! Character count.

use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use crate::worker::{Inputter, MapSink, Mapper};

const CHARS_PER_CHUNK: usize = 30;

/// Scans the string stored at the data reference into 30-character chunks.
pub struct CharStream;

impl Inputter for CharStream {
    fn scan(
        &self,
        store: &dyn KeyValueStore,
        data_ref: &str,
        emit: &mut dyn FnMut(String, Vec<String>) -> Result<()>,
    ) -> Result<()> {
        let text = store
            .get(data_ref)?
            .ok_or_else(|| Error::worker(format!("no data stored at `{}`", data_ref)))?;
        let chars: Vec<char> = text.chars().collect();
        for (idx, chunk) in chars.chunks(CHARS_PER_CHUNK).enumerate() {
            emit(idx.to_string(), vec![chunk.iter().collect()])?;
        }
        Ok(())
    }
}

/// Emits `(char, "1")` for every non-whitespace character.
pub struct CharCounter;

impl Mapper for CharCounter {
    fn map(&self, records: &[String], sink: &mut dyn MapSink) -> Result<()> {
        for c in records.iter().flat_map(|r| r.chars()) {
            if !c.is_whitespace() {
                sink.emit(c.encode_utf8(&mut [0; 4]), "1")?;
            }
        }
        Ok(())
    }
}
