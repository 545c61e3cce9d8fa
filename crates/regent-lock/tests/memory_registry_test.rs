// Integration tests for MemoryLockRegistry
// Exercises contention between handles and exclusive ownership under random schedules

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use regent_lock::{DistributedLock, LockRegistry, MemoryLockConfig, MemoryLockRegistry};

#[derive(Debug, Clone)]
enum Op {
    Acquire(usize),
    Release(usize),
}

fn op_strategy(handles: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..handles).prop_map(Op::Acquire),
        (0..handles).prop_map(Op::Release),
    ]
}

proptest! {
    #[test]
    fn prop_single_owner_under_random_ops(ops in proptest::collection::vec(op_strategy(4), 1..64)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        rt.block_on(async {
            let registry = MemoryLockRegistry::default();
            let handles: Vec<Arc<dyn DistributedLock>> =
                (0..4).map(|_| registry.obtain("role")).collect();
            let mut holds = [0u32; 4];

            for op in ops {
                match op {
                    Op::Acquire(i) => {
                        let acquired = handles[i].try_acquire(Duration::ZERO).await.unwrap();
                        let someone_else = holds
                            .iter()
                            .enumerate()
                            .any(|(j, h)| j != i && *h > 0);
                        prop_assert_eq!(acquired, !someone_else);
                        if acquired {
                            holds[i] += 1;
                        }
                    }
                    Op::Release(i) => {
                        handles[i].release().await.unwrap();
                        holds[i] = holds[i].saturating_sub(1);
                    }
                }

                let owners = holds.iter().filter(|h| **h > 0).count();
                prop_assert!(owners <= 1);
                match registry.holder("role") {
                    Some(holder) => {
                        let idx = handles
                            .iter()
                            .position(|h| h.owner() == holder.owner)
                            .unwrap();
                        prop_assert_eq!(holder.holds, holds[idx]);
                    }
                    None => prop_assert_eq!(owners, 0),
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_critical_sections_never_overlap() {
    let registry = Arc::new(MemoryLockRegistry::new(MemoryLockConfig::with_ttl(
        Duration::from_secs(10),
    )));
    let inside = Arc::new(AtomicUsize::new(0));
    let entered = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let lock = registry.obtain("counter");
        let inside = inside.clone();
        let entered = entered.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                if lock.try_acquire(Duration::from_secs(5)).await.unwrap() {
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    entered.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    lock.release().await.unwrap();
                }
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(entered.load(Ordering::SeqCst), 80);
    assert_eq!(registry.stats().active_locks, 0);
}

#[tokio::test]
async fn test_distinct_keys_do_not_contend() {
    let registry = MemoryLockRegistry::default();
    let a = registry.obtain("role-a");
    let b = registry.obtain("role-b");

    assert!(a.try_acquire(Duration::ZERO).await.unwrap());
    assert!(b.try_acquire(Duration::ZERO).await.unwrap());

    let stats = registry.stats();
    assert_eq!(stats.total_locks, 2);
    assert_eq!(stats.active_locks, 2);
}
