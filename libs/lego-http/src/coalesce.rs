//! Request coalescing.
//!
//! Concurrent terminal calls carrying the same key share one execution. The
//! first caller installs the execution, later callers join it, and every
//! waiter receives a clone of the same [`Exchange`]. The execution removes its
//! own entry the moment it produces a result, so a call arriving afterwards
//! starts afresh instead of picking up a finished reply. If every waiter goes
//! away first, the last one to leave removes the entry.

use crate::middleware::Exchange;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Execution = Shared<BoxFuture<'static, Exchange>>;
type Flights = Arc<Mutex<FlightTable>>;

struct Flight {
    id: u64,
    execution: Execution,
    waiters: usize,
}

#[derive(Default)]
struct FlightTable {
    next_id: u64,
    flights: HashMap<String, Flight>,
}

impl FlightTable {
    /// Remove the entry for `key` only if it is still flight `id`.
    fn remove_if(&mut self, key: &str, id: u64) {
        if self.flights.get(key).is_some_and(|f| f.id == id) {
            self.flights.remove(key);
        }
    }
}

/// In-flight table of one client.
#[derive(Default)]
pub(crate) struct Coalescer {
    table: Flights,
}

impl Coalescer {
    /// Join the execution in flight for `key`, or install the one built by `start`.
    ///
    /// `start` is only called when no execution for `key` is in flight.
    pub(crate) async fn run<F>(&self, key: String, start: F) -> Exchange
    where
        F: FnOnce() -> BoxFuture<'static, Exchange>,
    {
        let (id, execution) = {
            let mut guard = self.table.lock();
            let table = &mut *guard;
            if let Some(flight) = table.flights.get_mut(&key) {
                flight.waiters += 1;
                tracing::trace!(coalesce_key = %key, waiters = flight.waiters, "joined in-flight execution");
                (flight.id, flight.execution.clone())
            } else {
                tracing::trace!(coalesce_key = %key, "starting coalesced execution");
                let id = table.next_id;
                table.next_id = table.next_id.wrapping_add(1);
                let execution = finish_then_release(Arc::clone(&self.table), key.clone(), id, start());
                table.flights.insert(
                    key.clone(),
                    Flight {
                        id,
                        execution: execution.clone(),
                        waiters: 1,
                    },
                );
                (id, execution)
            }
        };

        let ticket = Ticket {
            table: &self.table,
            key,
            id,
        };
        let exchange = execution.await;
        drop(ticket);
        exchange
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.table.lock().flights.len()
    }
}

/// Wrap `work` so that it drops its table entry as soon as it has a result,
/// before any waiter observes that result.
fn finish_then_release(
    table: Flights,
    key: String,
    id: u64,
    work: BoxFuture<'static, Exchange>,
) -> Execution {
    async move {
        let exchange = work.await;
        table.lock().remove_if(&key, id);
        exchange
    }
    .boxed()
    .shared()
}

/// Releases one waiter's hold on a flight, on completion or cancellation.
struct Ticket<'a> {
    table: &'a Mutex<FlightTable>,
    key: String,
    id: u64,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        let Some(flight) = table.flights.get_mut(&self.key) else {
            return;
        };
        // a newer execution under the same key is not ours to touch
        if flight.id != self.id {
            return;
        }
        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters == 0 {
            table.flights.remove(&self.key);
        }
    }
}
