//! Streaming result consumption.

use ember_common::types::Value;

/// State passed to a [`ResultHandler`] for each row.
#[derive(Debug)]
pub struct ResultContext<'a> {
    object: &'a Value,
    count: usize,
    stopped: bool,
}

impl<'a> ResultContext<'a> {
    /// Returns the current row.
    pub fn object(&self) -> &'a Value {
        self.object
    }

    /// Returns how many rows have been handed out, including this one.
    pub fn result_count(&self) -> usize {
        self.count
    }

    /// Asks for no further rows.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Returns true if the handler asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Consumes rows one at a time instead of collecting them.
pub trait ResultHandler {
    /// Handles one row.
    fn handle_result(&mut self, context: &mut ResultContext<'_>);
}

/// Feeds rows to a handler until they run out or the handler stops.
///
/// Returns the number of rows handed out.
pub fn handle_rows<'a, I>(handler: &mut dyn ResultHandler, rows: I) -> usize
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut count = 0;
    for object in rows {
        count += 1;
        let mut context = ResultContext {
            object,
            count,
            stopped: false,
        };
        handler.handle_result(&mut context);
        if context.is_stopped() {
            break;
        }
    }
    count
}

/// Handler that collects every row.
#[derive(Debug, Default)]
pub struct CollectingResultHandler {
    rows: Vec<Value>,
}

impl CollectingResultHandler {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected rows.
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    /// Consumes the handler, returning the collected rows.
    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }
}

impl ResultHandler for CollectingResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext<'_>) {
        self.rows.push(context.object().clone());
    }
}
