//! Auto-reload against a real primary thread and tokio timers

use fastswap_kernel::{ModuleManifest, ReloadPolicy};
use fastswap_runtime::hot_reload::{
    AutoReloadWatcher, DescriptorLoader, WatchEvent, WatchEventKind, WatchSink,
};
use fastswap_runtime::{
    EmbeddedHost, HostLayout, ModuleHost, PrimaryThread, ReloadEvent, ReloadOrchestrator,
};
use fastswap_testing::{ModuleDir, manifest};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn recording_sink() -> (WatchSink, Arc<Mutex<Vec<WatchEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::clone(&seen);
    (
        Arc::new(move |event| {
            events.lock().push(event);
            Ok(())
        }),
        seen,
    )
}

#[test]
fn test_timestamps_drive_enqueued_work() {
    let dir = ModuleDir::with_modules(&["alpha", "beta"]).unwrap();
    dir.touch("alpha.zip", 10).unwrap();
    dir.touch("beta.zip", 10).unwrap();
    let host = Arc::new(EmbeddedHost::new(HostLayout::Flat, dir.path()));
    host.bootstrap();
    let (sink, seen) = recording_sink();
    let mut watcher = AutoReloadWatcher::new(DescriptorLoader::new(dir.path()), host, sink);

    assert_eq!(watcher.poll_once(), 0);
    assert_eq!(watcher.poll_once(), 0);

    dir.touch("beta.zip", 20).unwrap();
    assert_eq!(watcher.poll_once(), 1);
    assert_eq!(watcher.poll_once(), 0);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, WatchEventKind::Modified);
    assert_eq!(seen[0].module, "beta");
}

async fn next_matching(
    events: &mut broadcast::Receiver<ReloadEvent>,
    wanted: impl Fn(&ReloadEvent) -> bool,
) -> ReloadEvent {
    timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for reload event")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_reloads_changed_and_loads_new_archives() {
    let dir = ModuleDir::with_modules(&["alpha"]).unwrap();
    let host = Arc::new(EmbeddedHost::new(HostLayout::Nested, dir.path()));
    host.bootstrap();
    let first = host.module("alpha").unwrap().instance_id();

    let primary = Arc::new(PrimaryThread::spawn("fastswap-primary-test").unwrap());
    let orchestrator = ReloadOrchestrator::builder(host.clone(), primary.clone(), dir.path())
        .with_policy(ReloadPolicy::new().with_poll_interval_ticks(1))
        .with_runtime(tokio::runtime::Handle::current())
        .build();
    let mut events = orchestrator.subscribe();
    orchestrator.start();
    assert!(orchestrator.is_watching());

    // Let the first poll record what is on disk.
    tokio::time::sleep(Duration::from_millis(200)).await;

    dir.replace(
        "alpha.zip",
        &ModuleManifest::new("alpha", "alpha::Main").with_version("1.1.0"),
        1_000_000,
    )
    .unwrap();

    let reloaded = next_matching(&mut events, |e| {
        matches!(e, ReloadEvent::ModuleReloaded { module, .. } if module == "alpha")
    })
    .await;
    assert!(matches!(reloaded, ReloadEvent::ModuleReloaded { .. }));
    let alpha = host.module("alpha").unwrap();
    assert_ne!(alpha.instance_id(), first);
    assert_eq!(alpha.manifest().version, "1.1.0");

    dir.replace("gamma.zip", &manifest("gamma"), 1_000_000).unwrap();
    next_matching(&mut events, |e| {
        matches!(e, ReloadEvent::ModuleLoaded { module, .. } if module == "gamma")
    })
    .await;
    assert!(host.is_module_enabled("gamma"));
    assert!(host.dispatch("gamma-cmd").is_some());

    orchestrator.shutdown();
    assert!(!orchestrator.is_watching());
    primary.shutdown();
}
