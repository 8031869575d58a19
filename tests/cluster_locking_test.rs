use clusterlock::{
    ClusterLockingService, ClusteringConfig, ClusteringService, Interrupted, LocalNetwork, LockingOptions,
    LockingService, TransportConfig,
};
use slog::Drain;
use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

const CLUSTER: &str = "locking-test";
const SHORT: Duration = Duration::from_millis(100);
const LONG: Duration = Duration::from_secs(5);

struct Member {
    clustering: ClusteringService,
    locking: ClusterLockingService,
}

#[tokio::test]
async fn mutual_exclusion_across_members() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;

    assert_eq!(member1.locking.try_lock(&["lock1"]).await, Ok(true));
    assert_eq!(member2.locking.try_lock_timeout(SHORT, &["lock1"]).await, Ok(false));

    assert!(member1.locking.unlock(&["lock1"]).await);
    assert_eq!(member2.locking.try_lock_timeout(LONG, &["lock1"]).await, Ok(true));
    assert_eq!(member1.locking.try_lock_timeout(SHORT, &["lock1"]).await, Ok(false));

    Ok(())
}

#[tokio::test]
async fn multi_lock_is_atomic_and_release_is_observed() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;

    assert_eq!(member1.locking.try_lock(&["lock1", "lock2"]).await, Ok(true));
    assert_eq!(member2.locking.try_lock_timeout(SHORT, &["lock2", "lock3"]).await, Ok(false));
    assert_eq!(member2.locking.try_lock_timeout(SHORT, &["lock3"]).await, Ok(true));

    assert!(member1.locking.unlock(&["lock2"]).await);
    assert_eq!(member2.locking.try_lock_timeout(LONG, &["lock2", "lock3"]).await, Ok(true));
    assert!(!member1.locking.unlock(&["lock2"]).await);

    Ok(())
}

#[tokio::test]
async fn reentrant_acquisition_needs_one_unlock() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    let names = ["lock1", "lock2", "lock3"];

    for _ in 0..3 {
        assert_eq!(member2.locking.try_lock(&names).await, Ok(true));
    }
    assert_eq!(member1.locking.try_lock_timeout(SHORT, &names).await, Ok(false));

    assert!(member2.locking.unlock(&names).await);
    assert_eq!(member1.locking.try_lock_timeout(LONG, &names).await, Ok(true));

    Ok(())
}

#[tokio::test]
async fn holders_on_one_member_exclude_each_other() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member = start_member(&network).await?;
    let other_holder = member.locking.new_holder();

    assert_eq!(member.locking.try_lock(&["lock1"]).await, Ok(true));
    assert_eq!(other_holder.try_lock_timeout(SHORT, &["lock1"]).await, Ok(false));
    assert!(!other_holder.unlock(&["lock1"]).await);

    Ok(())
}

#[tokio::test]
async fn shutdown_releases_locks() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    assert_eq!(member1.locking.try_lock(&["lock1", "lock2"]).await, Ok(true));

    assert!(member1.locking.shutdown().await);
    assert!(!member1.locking.shutdown().await);

    assert_eq!(member2.locking.try_lock_timeout(LONG, &["lock1", "lock2"]).await, Ok(true));
    assert_eq!(member1.locking.try_lock_timeout(SHORT, &["lock9"]).await, Ok(false));

    Ok(())
}

#[tokio::test]
async fn leaving_member_loses_its_locks() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    assert_eq!(member1.locking.try_lock(&["lock1"]).await, Ok(true));

    // The coordinator itself leaves, so the second member takes over.
    assert!(member1.clustering.shutdown().await);

    assert_eq!(member2.locking.try_lock_timeout(LONG, &["lock1"]).await, Ok(true));
    assert_eq!(member2.clustering.members_in_cluster(), 1);

    Ok(())
}

#[tokio::test]
async fn failed_member_loses_its_locks() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    let member3 = start_member(&network).await?;
    assert_eq!(member2.locking.try_lock(&["lock1"]).await, Ok(true));
    assert_eq!(member3.locking.try_lock_timeout(SHORT, &["lock1"]).await, Ok(false));

    member2.clustering.abort();

    let started = Instant::now();
    assert_eq!(member3.locking.try_lock_timeout(LONG, &["lock1"]).await, Ok(true));
    assert!(started.elapsed() < LONG);
    assert!(wait_until(|| member1.clustering.members_in_cluster() == 2).await);

    Ok(())
}

#[tokio::test]
async fn request_in_flight_is_decided_by_the_next_coordinator() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    let member3 = start_member(&network).await?;

    let started = Instant::now();
    let (acquired, _) = tokio::join!(member3.locking.try_lock_timeout(LONG, &["x"]), async {
        tokio::task::yield_now().await;
        member1.clustering.abort();
    });

    assert_eq!(acquired, Ok(true));
    assert!(started.elapsed() < LONG);
    assert!(wait_until(|| member2.clustering.members_in_cluster() == 2).await);
    assert!(member2.clustering.current_view().is_coordinator(member2.clustering.local_member()));
    let owner = member3.locking.owner().clone();
    assert!(wait_until(|| member2.locking.lock_record("x").map(|r| r.owner) == Some(owner.clone())).await);

    Ok(())
}

#[tokio::test]
async fn abandoned_grant_is_released_again() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;

    // No reply can arrive within a zero timeout, but the coordinator still grants.
    assert_eq!(member2.locking.try_lock_timeout(Duration::from_millis(0), &["lock1"]).await, Ok(false));

    assert_eq!(member1.locking.try_lock_timeout(LONG, &["lock1"]).await, Ok(true));
    assert!(wait_until(|| member2.locking.held_names().is_empty()).await);

    Ok(())
}

#[tokio::test]
async fn interrupt_aborts_the_wait() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    assert_eq!(member1.locking.try_lock(&["lock1"]).await, Ok(true));

    let waiter = Arc::new(member2.locking.new_holder());
    let task = {
        let waiter = waiter.clone();
        tokio::spawn(async move { waiter.try_lock_timeout(LONG, &["lock1", "lock2"]).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    waiter.interrupt();

    assert_eq!(task.await?, Err(Interrupted));
    assert_eq!(member1.locking.try_lock_timeout(LONG, &["lock2"]).await, Ok(true));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusivity_under_stress() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let member2 = start_member(&network).await?;
    let acquired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(100);
    for task_id in 0..100 {
        let holder = if task_id % 2 == 0 {
            member1.locking.new_holder()
        } else {
            member2.locking.new_holder()
        };
        let acquired = acquired.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..3 {
                let name = format!("task-{}-lock-{}", task_id, i);
                let names = [name.as_str(), "shared"];
                assert_eq!(holder.try_lock_timeout(Duration::from_secs(60), &names).await, Ok(true));
                acquired.lock().unwrap().push(name.clone());
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
    assert!(started.elapsed() < Duration::from_secs(120));
    Ok(())
}

#[tokio::test]
async fn clusters_on_one_network_are_independent() -> Result<(), Box<dyn Error>> {
    let network = new_network();
    let member1 = start_member(&network).await?;
    let elsewhere = start_member_of(&network, "another-cluster").await?;

    assert_eq!(member1.locking.try_lock(&["lock1"]).await, Ok(true));
    assert_eq!(elsewhere.locking.try_lock_timeout(LONG, &["lock1"]).await, Ok(true));

    Ok(())
}

fn new_network() -> LocalNetwork {
    LocalNetwork::with_failure_detection_interval(test_logger(), Duration::from_millis(20))
}

async fn start_member(network: &LocalNetwork) -> Result<Member, Box<dyn Error>> {
    start_member_of(network, CLUSTER).await
}

async fn start_member_of(network: &LocalNetwork, cluster_name: &str) -> Result<Member, Box<dyn Error>> {
    let config = ClusteringConfig::new(cluster_name, TransportConfig::Local(network.clone()), test_logger());
    let clustering = ClusteringService::start_standalone(config).await?;
    let locking = ClusterLockingService::start(&clustering, test_logger(), LockingOptions::default())?;

    assert!(wait_until(|| locking.is_synchronized()).await);
    Ok(Member { clustering, locking })
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + LONG;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
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

    slog::Logger::root(drain, slog::o!("Test" => "cluster"))
}
