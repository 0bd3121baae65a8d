//! Worker thread main loop: cooperative ticks over assigned sessions,
//! energy-saver idling, preemption alarm and stat snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use portable_atomic::Ordering;

use super::{pipeline, Shared};
use crate::stats::{WorkerHotStats, WorkerState};

/// Pacing sleep between ticks while active.
const TICK_SLEEP: Duration = Duration::from_millis(1);

pub(crate) fn worker_main(shared: Arc<Shared>, idx: usize) {
    let w = Arc::clone(&shared.workers[idx]);
    let mut hot = WorkerHotStats::default();
    let mut last_activity = Instant::now();

    loop {
        let run = shared.run.load(Ordering::SeqCst);
        if run <= 0 {
            break;
        }

        let tick_start = Instant::now();
        let assigned: Vec<_> = w.assigned.lock().clone();
        hot.num_sessions = assigned.len();
        hot.num_groups = {
            let mixers = shared.mixers.lock();
            mixers.values().filter(|m| assigned.contains(&m.owner)).count()
        };

        let mut any_input = false;
        for &id in &assigned {
            if !shared.queues[id as usize].ingress.is_empty() {
                any_input = true;
            }
            pipeline::tick_session(&shared, id, false, &mut hot);
        }
        hot.ticks += 1;

        let elapsed = tick_start.elapsed();
        if elapsed.as_millis() as u64 > shared.cfg.preemption_alarm.0 {
            hot.preemption_warnings += 1;
            shared.log_warning(format!(
                "worker {idx} tick ran {} ms (alarm at {} ms)",
                elapsed.as_millis(),
                shared.cfg.preemption_alarm.0
            ));
        }

        if w.profiling.load(Ordering::Relaxed) {
            *w.snapshot.lock() = hot.clone();
        }

        // energy saver: no ingress traffic for the inactivity window puts
        // the worker into a deeper sleep, left on the next push (wake
        // notify) or non-empty ingress
        if any_input {
            last_activity = Instant::now();
            if WorkerState::from_u32(w.state.load(Ordering::Relaxed)) == WorkerState::EnergySaver {
                w.state.store(WorkerState::Run.as_u32(), Ordering::Relaxed);
            }
            continue; // keep draining without a pacing sleep
        }

        let inactivity = shared.cfg.energy_saver_inactivity.0;
        if inactivity > 0 && last_activity.elapsed().as_millis() as u64 > inactivity {
            w.state
                .store(WorkerState::EnergySaver.as_u32(), Ordering::Relaxed);
            let mut guard = w.wake_lock.lock();
            let _ = w
                .wake
                .wait_for(&mut guard, Duration::from_micros(shared.cfg.energy_saver_sleep.0));
        } else {
            std::thread::sleep(TICK_SLEEP);
        }
    }

    // shutdown: one closing pass drains pending egress work
    w.state.store(WorkerState::Closing.as_u32(), Ordering::Relaxed);
    let assigned: Vec<_> = w.assigned.lock().clone();
    for &id in &assigned {
        pipeline::tick_session(&shared, id, false, &mut hot);
    }
    *w.snapshot.lock() = hot;
    w.state.store(WorkerState::Exited.as_u32(), Ordering::Relaxed);
}
