//! Lazily fetched query results.
//!
//! A [`Cursor`] pulls rows from the strategy's row source on demand. It can
//! be iterated once: asking for a second iterator, or iterating after
//! close, is an error.

use std::fmt;

use ember_common::error::{EmberError, EmberResult};
use ember_common::types::Value;

/// Row source behind a cursor.
pub type RowSource = Box<dyn Iterator<Item = EmberResult<Value>> + Send>;

/// Cursor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, no iterator handed out yet.
    Created,
    /// Rows are being read.
    Open,
    /// Every row has been read.
    Consumed,
    /// Closed before or after reading.
    Closed,
}

/// A non-restartable sequence of rows.
pub struct Cursor {
    rows: Option<RowSource>,
    state: CursorState,
    iterator_retrieved: bool,
    index: usize,
}

impl Cursor {
    /// Creates a cursor over a row source.
    pub fn new(rows: RowSource) -> Self {
        Self {
            rows: Some(rows),
            state: CursorState::Created,
            iterator_retrieved: false,
            index: 0,
        }
    }

    /// Creates a cursor over already materialized rows.
    pub fn from_rows(rows: Vec<Value>) -> Self {
        Self::new(Box::new(rows.into_iter().map(Ok)))
    }

    /// Returns the cursor state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns true while rows are being read.
    pub fn is_open(&self) -> bool {
        self.state == CursorState::Open
    }

    /// Returns true once every row has been read.
    pub fn is_consumed(&self) -> bool {
        self.state == CursorState::Consumed
    }

    /// Returns the number of rows read so far.
    pub fn rows_read(&self) -> usize {
        self.index
    }

    /// Returns the iterator over the rows.
    ///
    /// Fails if the cursor is closed or an iterator was already retrieved.
    pub fn iter(&mut self) -> EmberResult<CursorIter<'_>> {
        if self.state == CursorState::Closed {
            return Err(EmberError::Cursor {
                message: "a closed cursor cannot be iterated".to_string(),
            });
        }
        if self.iterator_retrieved {
            return Err(EmberError::Cursor {
                message: "cursor already retrieved an iterator".to_string(),
            });
        }
        self.iterator_retrieved = true;
        self.state = CursorState::Open;
        Ok(CursorIter { cursor: self })
    }

    /// Reads every remaining row.
    pub fn fetch_all(&mut self) -> EmberResult<Vec<Value>> {
        self.iter()?.collect()
    }

    /// Closes the cursor and releases its row source.
    pub fn close(&mut self) {
        self.rows = None;
        self.state = CursorState::Closed;
    }

    fn next_row(&mut self) -> Option<EmberResult<Value>> {
        if self.state != CursorState::Open {
            return None;
        }
        let next = self.rows.as_mut().and_then(Iterator::next);
        match next {
            Some(row) => {
                self.index += 1;
                Some(row)
            }
            None => {
                self.rows = None;
                self.state = CursorState::Consumed;
                None
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("rows_read", &self.index)
            .finish()
    }
}

/// Iterator over a cursor's rows.
pub struct CursorIter<'a> {
    cursor: &'a mut Cursor,
}

impl fmt::Debug for CursorIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorIter")
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Iterator for CursorIter<'_> {
    type Item = EmberResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> Cursor {
        Cursor::from_rows(vec![Value::from(1), Value::from(2)])
    }

    #[test]
    fn test_iterate_once() {
        let mut cursor = cursor();
        assert_eq!(cursor.state(), CursorState::Created);

        let rows: Vec<Value> = cursor.iter().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows, vec![Value::from(1), Value::from(2)]);
        assert!(cursor.is_consumed());
        assert_eq!(cursor.rows_read(), 2);

        let err = cursor.iter().unwrap_err();
        assert!(matches!(err, EmberError::Cursor { .. }));
    }

    #[test]
    fn test_partial_read_then_close() {
        let mut cursor = cursor();
        {
            let mut iter = cursor.iter().unwrap();
            assert_eq!(iter.next().unwrap().unwrap(), Value::from(1));
            assert_eq!(
                format!("{:?}", iter),
                "CursorIter { cursor: Cursor { state: Open, rows_read: 1 } }"
            );
        }
        assert!(cursor.is_open());

        cursor.close();
        assert_eq!(cursor.state(), CursorState::Closed);
        assert!(cursor.iter().is_err());
    }

    #[test]
    fn test_closed_before_iteration() {
        let mut cursor = cursor();
        cursor.close();
        assert!(cursor.fetch_all().is_err());
    }

    #[test]
    fn test_row_errors_surface() {
        let rows: Vec<EmberResult<Value>> =
            vec![Ok(Value::from(1)), Err(EmberError::database("connection reset"))];
        let mut cursor = Cursor::new(Box::new(rows.into_iter()));
        assert!(cursor.fetch_all().is_err());
    }
}
