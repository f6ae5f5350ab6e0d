//! Buffered row cursor for QUERY result sets too large for one message.
//!
//! `SPEC_FULL.md` §4.6 requires a QUERY whose rows don't fit a bounded
//! response buffer to yield a partial `ROWS` message (`end_of_message` unset)
//! and await a `FetchRows` continuation request for the next chunk. The
//! worker still materialises the full result set in one pool job (there is
//! no socket to suspend mid-query against), but the gateway hands it to the
//! calling thread in bounded chunks via this cursor rather than in one
//! message, so `MAX_ROWS_PER_CHUNK` bounds every `Response::Rows` payload.

use crate::wire::{ColumnType, ColumnValue};

pub(crate) const MAX_ROWS_PER_CHUNK: usize = 256;

pub(crate) struct RowStream {
    columns: Vec<ColumnType>,
    rows: std::vec::IntoIter<Vec<ColumnValue>>,
}

impl RowStream {
    pub(crate) fn new(columns: Vec<ColumnType>, rows: Vec<Vec<ColumnValue>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    pub(crate) fn columns(&self) -> Vec<ColumnType> {
        self.columns.clone()
    }

    /// Pull up to `MAX_ROWS_PER_CHUNK` rows. The second element of the
    /// returned tuple is `true` once the stream has no rows left.
    pub(crate) fn next_chunk(&mut self) -> (Vec<Vec<ColumnValue>>, bool) {
        let mut chunk = Vec::new();
        for _ in 0..MAX_ROWS_PER_CHUNK {
            match self.rows.next() {
                Some(row) => chunk.push(row),
                None => break,
            }
        }
        (chunk, self.rows.len() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: i64) -> Vec<ColumnValue> {
        vec![ColumnValue::Integer(n)]
    }

    #[test]
    fn short_result_set_is_exhausted_in_one_chunk() {
        let mut stream = RowStream::new(vec![ColumnType::Integer], vec![row(1), row(2)]);
        let (chunk, exhausted) = stream.next_chunk();
        assert_eq!(chunk.len(), 2);
        assert!(exhausted);
    }

    #[test]
    fn long_result_set_splits_across_chunks() {
        let rows: Vec<_> = (0..(MAX_ROWS_PER_CHUNK + 10) as i64).map(row).collect();
        let mut stream = RowStream::new(vec![ColumnType::Integer], rows);

        let (first, exhausted) = stream.next_chunk();
        assert_eq!(first.len(), MAX_ROWS_PER_CHUNK);
        assert!(!exhausted);

        let (second, exhausted) = stream.next_chunk();
        assert_eq!(second.len(), 10);
        assert!(exhausted);
    }
}
