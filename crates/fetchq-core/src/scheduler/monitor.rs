//! The admission monitor loop.

use std::sync::Arc;

use super::{transfer, Shared};

/// Drains the pending stack, one admission per tick, until it is empty.
///
/// Each iteration waits for the serialization gate (serialized mode only:
/// every admitted request released) and the budget gate (room for one more
/// transfer), then admits the next request and spawns its transfer without
/// awaiting it.
pub(super) async fn run_monitor(shared: Arc<Shared>, generation: u64) {
    tracing::debug!(generation, "admission monitor started");
    let mut stats = shared.stats.subscribe();

    // Let submissions made in the same tick pile up before the first pop.
    shared.tick().await;

    loop {
        if retire_if_drained(&shared, generation) {
            break;
        }

        if shared.serialized.is_enabled() {
            let released = stats.wait_for(|s| s.outstanding == 0).await.is_ok();
            if !released {
                break;
            }
        }

        let budget = shared.budget;
        let has_room = stats.wait_for(|s| budget.has_room(s)).await.is_ok();
        if !has_room {
            break;
        }

        admit_next(&shared);
        shared.tick().await;
    }

    tracing::debug!(generation, "admission monitor finished");
}

/// Clears the monitor slot when nothing is pending. Returns true if the
/// monitor should exit.
fn retire_if_drained(shared: &Shared, generation: u64) -> bool {
    let mut queue = shared.lock_queue();
    if !queue.pending.is_empty() {
        return false;
    }
    if queue
        .monitor
        .as_ref()
        .is_some_and(|slot| slot.generation == generation)
    {
        queue.monitor = None;
    }
    true
}

fn admit_next(shared: &Arc<Shared>) {
    let (request, index) = {
        let mut queue = shared.lock_queue();
        let Some(request) = queue.pending.pop() else {
            return;
        };
        let index = queue.next_admission;
        queue.next_admission += 1;
        shared.update_stats(|s| {
            s.pending = s.pending.saturating_sub(1);
            shared.budget.reserve(s);
            s.outstanding += 1;
            s.admitted += 1;
        });
        (request, index)
    };

    if let Err(state) = request.admit(index) {
        tracing::warn!(
            id = request.id(),
            url = request.url(),
            ?state,
            "queued request was not waiting for admission; skipped"
        );
        shared.update_stats(|s| {
            shared.budget.release(s);
            s.outstanding = s.outstanding.saturating_sub(1);
        });
        return;
    }

    tracing::debug!(
        id = request.id(),
        url = request.url(),
        index,
        "request admitted"
    );
    shared
        .runtime
        .spawn(transfer::run_transfer(Arc::clone(shared), request));
}
