use clusterlock::{Interrupted, LockingOptions, LockingService, StandaloneLockingService};
use slog::Drain;
use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(10);

#[tokio::test]
async fn multi_lock_is_atomic() -> Result<(), Box<dyn Error>> {
    let service1 = new_service()?;
    let service2 = service1.new_holder();

    assert_eq!(service1.try_lock(&["lock1", "lock2"]).await, Ok(true));
    assert_eq!(service2.try_lock_timeout(SHORT, &["lock2", "lock3"]).await, Ok(false));
    assert_eq!(service2.try_lock_timeout(SHORT, &["lock3"]).await, Ok(true));

    Ok(())
}

#[tokio::test]
async fn release_and_reacquire() -> Result<(), Box<dyn Error>> {
    let service1 = new_service()?;
    let service2 = service1.new_holder();
    assert_eq!(service1.try_lock(&["lock1", "lock2"]).await, Ok(true));
    assert_eq!(service2.try_lock_timeout(SHORT, &["lock2", "lock3"]).await, Ok(false));

    assert!(service1.unlock(&["lock2"]).await);
    assert_eq!(service2.try_lock_timeout(SHORT, &["lock2", "lock3"]).await, Ok(true));
    assert!(!service1.unlock(&["lock2"]).await);
    assert_eq!(service1.held_names(), vec!["lock1".to_string()]);

    Ok(())
}

#[tokio::test]
async fn reentrant_acquisition_needs_one_unlock() -> Result<(), Box<dyn Error>> {
    let service1 = new_service()?;
    let service2 = service1.new_holder();
    let names = ["lock1", "lock2", "lock3"];

    for _ in 0..3 {
        assert_eq!(service1.try_lock_timeout(SHORT, &names).await, Ok(true));
    }
    assert_eq!(service2.try_lock_timeout(SHORT, &names).await, Ok(false));

    assert!(service1.unlock(&names).await);
    assert_eq!(service2.try_lock_timeout(SHORT, &names).await, Ok(true));

    Ok(())
}

#[tokio::test]
async fn shutdown_releases_locks() -> Result<(), Box<dyn Error>> {
    let service1 = new_service()?;
    let service2 = service1.new_holder();
    assert_eq!(service1.try_lock(&["lock1", "lock2"]).await, Ok(true));

    assert!(service1.shutdown().await);
    assert!(!service1.shutdown().await);

    assert_eq!(service2.try_lock_timeout(SHORT, &["lock1", "lock2"]).await, Ok(true));
    assert_eq!(service1.try_lock_timeout(SHORT, &["lock9"]).await, Ok(false));

    Ok(())
}

#[tokio::test]
async fn contended_lock_is_handed_over_on_unlock() -> Result<(), Box<dyn Error>> {
    let service1 = new_service()?;
    let service2 = Arc::new(service1.new_holder());
    assert_eq!(service1.try_lock(&["lock1"]).await, Ok(true));

    let waiter = {
        let service2 = service2.clone();
        tokio::spawn(async move { service2.try_lock_timeout(Duration::from_secs(5), &["lock1"]).await })
    };
    sleep(Duration::from_millis(50)).await;
    assert!(service1.unlock(&["lock1"]).await);

    assert_eq!(waiter.await?, Ok(true));
    Ok(())
}

#[tokio::test]
async fn interrupt_aborts_the_wait_and_leaves_nothing_behind() -> Result<(), Box<dyn Error>> {
    let service1 = new_service()?;
    let service2 = Arc::new(service1.new_holder());
    assert_eq!(service1.try_lock(&["lock2"]).await, Ok(true));

    let waiter = {
        let service2 = service2.clone();
        tokio::spawn(async move { service2.try_lock_timeout(Duration::from_secs(5), &["lock1", "lock2"]).await })
    };
    sleep(Duration::from_millis(50)).await;
    service2.interrupt();

    assert_eq!(waiter.await?, Err(Interrupted));
    assert!(service2.held_names().is_empty());
    assert_eq!(service1.try_lock_timeout(SHORT, &["lock1"]).await, Ok(true));

    // The interruption is consumed.
    assert!(service1.unlock(&["lock2"]).await);
    assert_eq!(service2.try_lock_timeout(SHORT, &["lock2"]).await, Ok(true));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusivity_under_stress() -> Result<(), Box<dyn Error>> {
    let root = new_service()?;
    let acquired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(100);
    for task_id in 0..100 {
        let holder = root.new_holder();
        let acquired = acquired.clone();
        tasks.push(tokio::spawn(async move {
            let unique: Vec<String> = (0..3).map(|i| format!("task-{}-lock-{}", task_id, i)).collect();
            for name in unique.iter() {
                let names = [name.as_str(), "shared"];
                assert_eq!(holder.try_lock_timeout(Duration::from_secs(10), &names).await, Ok(true));
                acquired.lock().unwrap().push(name.clone());
                tokio::task::yield_now().await;
                assert!(holder.unlock(&names).await);
            }
        }));
    }
    for task in tasks {
        task.await?;
    }

    let acquired = acquired.lock().unwrap();
    let distinct: HashSet<&String> = acquired.iter().collect();
    assert_eq!(acquired.len(), 300);
    assert_eq!(distinct.len(), 300);
    assert!(started.elapsed() < Duration::from_secs(30));
    Ok(())
}

#[tokio::test]
async fn illegal_options_are_rejected() {
    let options = LockingOptions {
        release_timeout: Some(Duration::from_millis(0)),
        ..LockingOptions::default()
    };

    assert!(StandaloneLockingService::new(test_logger(), options).is_err());
}

fn new_service() -> Result<StandaloneLockingService, Box<dyn Error>> {
    Ok(StandaloneLockingService::new(test_logger(), LockingOptions::default())?)
}

fn test_logger() -> slog::Logger {
    if std::env::var("CLUSTERLOCK_TEST_LOG").is_ok() {
        create_root_logger_for_stdout()
    } else {
        slog::Logger::root(slog::Discard, slog::o!())
    }
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Test" => "standalone"))
}

async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
