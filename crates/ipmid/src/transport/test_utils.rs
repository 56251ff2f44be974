//! Test helpers for the transport module.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};

use super::{ConnectionHandler, ConnectionStream};

/// Counts accepted connections and drops them immediately.
pub(crate) struct CountingHandler {
    count: Rc<Cell<usize>>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Rc<Cell<usize>>, Rc<Self>) {
        let count = Rc::new(Cell::new(0));
        let handler = Rc::new(Self {
            count: Rc::clone(&count),
        });
        (count, handler)
    }
}

#[async_trait(?Send)]
impl ConnectionHandler for CountingHandler {
    async fn handle(&self, _stream: ConnectionStream) {
        self.count.set(self.count.get() + 1);
    }
}

/// Polls `count` until it reaches `expected` or two seconds pass.
pub(crate) async fn wait_for_count(count: &Cell<usize>, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if count.get() >= expected {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}
