//! Bounded worker pool for independent documents
//!
//! A feeder thread pushes work items into a bounded channel; `workers`
//! scoped threads pull from it and send results back on a second bounded
//! channel, which the calling thread drains. No ordering is guaranteed
//! between items.

use std::thread;

/// Run `work` over `items` on up to `workers` threads, handing each result
/// to `collect` on the calling thread as it arrives.
pub fn run_pool<T, R, F, C>(items: &[T], workers: usize, work: F, mut collect: C)
where
    T: Copy + Send + Sync,
    R: Send,
    F: Fn(T) -> R + Sync,
    C: FnMut(R),
{
    if items.is_empty() {
        return;
    }
    let worker_count = workers.max(1).min(items.len());
    let capacity = worker_count * 2;

    let (work_tx, work_rx) = crossbeam_channel::bounded::<T>(capacity);
    let (result_tx, result_rx) = crossbeam_channel::bounded::<R>(capacity);

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let rx = work_rx.clone();
            let tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                for item in rx.iter() {
                    if tx.send(work(item)).is_err() {
                        break;
                    }
                }
            });
        }
        // Workers hold the only remaining handles.
        drop(work_rx);
        drop(result_tx);

        scope.spawn(move || {
            for item in items {
                if work_tx.send(*item).is_err() {
                    break;
                }
            }
        });

        for result in result_rx.iter() {
            collect(result);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_item_processed_once() {
        let items: Vec<u64> = (0..200).collect();
        let mut results = Vec::new();
        run_pool(&items, 4, |x| x * 2, |r| results.push(r));
        results.sort_unstable();
        assert_eq!(results, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_more_workers_than_items() {
        let calls = AtomicUsize::new(0);
        let mut seen = 0;
        run_pool(
            &[1u64, 2],
            16,
            |_| calls.fetch_add(1, Ordering::SeqCst),
            |_| seen += 1,
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_empty_input() {
        let mut seen = 0;
        run_pool(&[] as &[u64], 4, |x| x, |_| seen += 1);
        assert_eq!(seen, 0);
    }
}
