//! End-to-end reload scenarios against the embedded host

use fastswap_kernel::{FilterMode, ModuleHost, ModuleManifest, Notice, ReloadError, ReloadMode, ReloadPolicy};
use fastswap_runtime::hot_reload::{ReloadEvent, ReloadKind};
use fastswap_runtime::{EmbeddedHost, HostLayout, ReloadOrchestrator};
use fastswap_testing::{
    CountingHost, HostCalls, InlineScheduler, ModuleDir, RecordingRequester, assert_notified,
};
use std::sync::Arc;

struct World {
    dir: ModuleDir,
    host: Arc<CountingHost>,
    scheduler: Arc<InlineScheduler>,
    orchestrator: Arc<ReloadOrchestrator>,
}

impl World {
    fn new(layout: HostLayout, dir: ModuleDir, policy: ReloadPolicy) -> Self {
        let embedded = Arc::new(EmbeddedHost::new(layout, dir.path()));
        let report = embedded.bootstrap();
        assert!(report.failures.is_empty(), "{:?}", report.failures);

        let host = CountingHost::new(embedded);
        let scheduler = Arc::new(InlineScheduler::new());
        let orchestrator = ReloadOrchestrator::builder(host.clone(), scheduler.clone(), dir.path())
            .with_policy(policy)
            .build();
        Self {
            dir,
            host,
            scheduler,
            orchestrator,
        }
    }

    fn instance(&self, name: &str) -> uuid::Uuid {
        self.host.inner().module(name).unwrap().instance_id()
    }
}

#[test]
fn test_blacklisted_module_is_left_alone() {
    for layout in [HostLayout::Flat, HostLayout::Nested] {
        let dir = ModuleDir::with_modules(&["alpha", "beta", "core-utils"]).unwrap();
        let world = World::new(
            layout,
            dir,
            ReloadPolicy::new()
                .with_mode(ReloadMode::ModulesOnly)
                .with_filter_list(["core-utils"]),
        );
        let untouched = world.instance("core-utils");
        let alpha = world.instance("alpha");
        let beta = world.instance("beta");
        let admin = RecordingRequester::admin("admin");

        let outcome = world
            .orchestrator
            .reload(admin.clone(), "")
            .unwrap()
            .blocking_outcome()
            .unwrap();

        assert_eq!(outcome.kind, ReloadKind::Modules);
        assert_eq!(outcome.reloaded, vec!["alpha", "beta"]);
        assert!(outcome.is_success());
        assert_ne!(world.instance("alpha"), alpha);
        assert_ne!(world.instance("beta"), beta);
        assert_eq!(world.instance("core-utils"), untouched);

        let calls = world.host.calls();
        assert_eq!(calls.disable, 2);
        assert_eq!(calls.load, 2);
        assert_eq!(calls.enable, 2);
        assert_eq!(calls.full_reload, 0);

        assert_notified!(admin, Notice::Progress, "reloading all modules");
        let (notice, last) = admin.last().unwrap();
        assert_eq!(notice, Notice::Success);
        let ms: u128 = last
            .trim_start_matches("The host has successfully reloaded all modules in ")
            .trim_end_matches("ms.")
            .parse()
            .unwrap();
        assert!(ms < 60_000);
    }
}

#[test]
fn test_target_matches_declared_name_exactly() {
    let dir = ModuleDir::new().unwrap();
    dir.write(
        "alpha.zip",
        &ModuleManifest::new("Alpha-Core", "alpha::Main").with_command("greet", &["hi"]),
    )
    .unwrap();
    let world = World::new(HostLayout::Flat, dir, ReloadPolicy::default());
    let before = world.instance("Alpha-Core");
    world.host.reset_calls();
    let admin = RecordingRequester::admin("admin");

    let result = world
        .orchestrator
        .reload(admin.clone(), "alpha")
        .unwrap()
        .blocking_outcome();

    assert!(matches!(result, Err(ReloadError::ModuleNotFound(ref name)) if name == "alpha"));
    assert_notified!(admin, Notice::Failure, "The module \"alpha\" is not a valid module.");
    assert_eq!(world.instance("Alpha-Core"), before);
    assert_eq!(world.host.calls().lifecycle(), 0);
    assert!(world.host.inner().dispatch("greet").unwrap().is_registered());
}

#[test]
fn test_unauthorized_requester_changes_nothing() {
    let dir = ModuleDir::with_modules(&["alpha", "beta"]).unwrap();
    let world = World::new(HostLayout::Nested, dir, ReloadPolicy::default());
    let before = world.instance("alpha");
    world.host.reset_calls();
    let player = RecordingRequester::with_permissions("steve", &["fastswap.reloadconfig"]);

    for target in ["", "alpha"] {
        let result = world.orchestrator.reload(player.clone(), target);
        assert!(matches!(
            result,
            Err(ReloadError::AuthorizationDenied { ref requester }) if requester == "steve"
        ));
    }

    assert_eq!(world.host.calls(), HostCalls::default());
    assert_eq!(world.scheduler.ran(), 0);
    assert_eq!(world.instance("alpha"), before);
    assert_eq!(
        player.messages(),
        vec!["You do not have permission to run this command."; 2]
    );
}

#[test]
fn test_batch_continues_past_failures() {
    let dir = ModuleDir::with_modules(&["alpha", "beta", "gamma"]).unwrap();
    let world = World::new(HostLayout::Flat, dir, ReloadPolicy::default());
    let gamma = world.instance("gamma");
    world.host.fail_disable("alpha");
    world.host.fail_enable("beta");
    let admin = RecordingRequester::admin("admin");

    let outcome = world
        .orchestrator
        .reload(admin.clone(), "")
        .unwrap()
        .blocking_outcome()
        .unwrap();

    assert_eq!(outcome.reloaded, vec!["gamma"]);
    let failed: Vec<_> = outcome.failures.iter().map(|f| f.module.as_str()).collect();
    assert_eq!(failed, vec!["alpha", "beta"]);
    assert!(matches!(
        outcome.failures[0].error,
        ReloadError::HostNativeCall { operation: "disable", .. }
    ));
    assert_ne!(world.instance("gamma"), gamma);

    // A failed enable leaves nothing behind for the new instance.
    assert!(world.host.inner().module("beta").is_none());
    assert!(world.host.inner().dispatch("beta-cmd").is_none());
    assert_notified!(admin, Notice::Failure, "Could not reload module \"beta\"");
    assert_notified!(admin, Notice::Failure, "Reloaded 1 of 3 modules");
}

#[test]
fn test_whitelist_and_blacklist_are_complements() {
    let names = ["alpha", "beta", "gamma", "delta"];
    let listed = [" Alpha", "GAMMA "];

    let reloaded = |mode: FilterMode| {
        let dir = ModuleDir::with_modules(&names).unwrap();
        let world = World::new(
            HostLayout::Nested,
            dir,
            ReloadPolicy::new().with_filter_mode(mode).with_filter_list(listed),
        );
        world
            .orchestrator
            .reload(RecordingRequester::admin("admin"), "")
            .unwrap()
            .blocking_outcome()
            .unwrap()
            .reloaded
    };

    assert_eq!(reloaded(FilterMode::Whitelist), vec!["alpha", "gamma"]);
    assert_eq!(reloaded(FilterMode::Blacklist), vec!["beta", "delta"]);
}

#[test]
fn test_full_mode_delegates_to_host() {
    let dir = ModuleDir::with_modules(&["alpha"]).unwrap();
    let world = World::new(
        HostLayout::Flat,
        dir,
        ReloadPolicy::new().with_mode(ReloadMode::Full),
    );
    world.host.reset_calls();
    let admin = RecordingRequester::admin("admin");

    let outcome = world
        .orchestrator
        .reload(admin.clone(), "")
        .unwrap()
        .blocking_outcome()
        .unwrap();

    assert_eq!(outcome.kind, ReloadKind::Full);
    assert_eq!(world.host.calls().full_reload, 1);
    assert_eq!(world.host.calls().disable, 0);
    assert_notified!(admin, Notice::Success, "The host has successfully reloaded in ");

    world.host.fail_full_reload();
    let result = world
        .orchestrator
        .reload(admin.clone(), "")
        .unwrap()
        .blocking_outcome();
    assert!(matches!(result, Err(ReloadError::HostNativeCall { .. })));
}

#[test]
fn test_updated_archive_is_picked_up_on_reload() {
    let dir = ModuleDir::with_modules(&["alpha"]).unwrap();
    let world = World::new(HostLayout::Nested, dir, ReloadPolicy::default());
    world
        .dir
        .write(
            "alpha.zip",
            &ModuleManifest::new("alpha", "alpha::Main")
                .with_version("2.0.0")
                .with_command("fresh", &["f"]),
        )
        .unwrap();

    world
        .orchestrator
        .reload(RecordingRequester::admin("admin"), "alpha")
        .unwrap()
        .blocking_outcome()
        .unwrap();

    let host = world.host.inner();
    assert_eq!(host.module("alpha").unwrap().manifest().version, "2.0.0");
    assert!(host.dispatch("alpha-cmd").is_none());
    assert!(host.dispatch("fresh").is_some());
    assert!(host.dispatch("alpha:f").is_some());
}

/// Whether `message` contains a `<digits>ms` figure
fn reports_millis(message: &str) -> bool {
    message.match_indices("ms").any(|(at, _)| {
        message[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

#[test]
fn test_failure_notices_carry_elapsed_time() {
    let dir = ModuleDir::with_modules(&["alpha", "beta"]).unwrap();
    let world = World::new(HostLayout::Flat, dir, ReloadPolicy::default());
    world.dir.remove("beta.zip").unwrap();
    let admin = RecordingRequester::admin("admin");
    let mut events = world.orchestrator.subscribe();

    let missing = world
        .orchestrator
        .reload(admin.clone(), "beta")
        .unwrap()
        .blocking_outcome();
    assert!(matches!(missing, Err(ReloadError::LoadFailure { .. })));
    let (notice, message) = admin.last().unwrap();
    assert_eq!(notice, Notice::Failure);
    assert!(message.starts_with("Could not reload module \"beta\" after "));
    assert!(reports_millis(&message), "{message}");

    let failed = std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
        ReloadEvent::ModuleFailed {
            module, duration, ..
        } => Some((module, duration)),
        _ => None,
    });
    assert!(matches!(failed, Some((ref module, _)) if module == "beta"));

    let unknown = world
        .orchestrator
        .reload(admin.clone(), "nope")
        .unwrap()
        .blocking_outcome();
    assert!(matches!(unknown, Err(ReloadError::ModuleNotFound(_))));
    let (_, message) = admin.last().unwrap();
    assert!(message.starts_with("The module \"nope\" is not a valid module."));
    assert!(reports_millis(&message), "{message}");

    world.host.fail_full_reload();
    world.orchestrator.apply_policy(
        ReloadPolicy::new()
            .with_mode(ReloadMode::Full)
            .with_auto_reload(false),
    );
    let result = world
        .orchestrator
        .reload(admin.clone(), "")
        .unwrap()
        .blocking_outcome();
    assert!(matches!(result, Err(ReloadError::HostNativeCall { .. })));
    let (notice, message) = admin.last().unwrap();
    assert_eq!(notice, Notice::Failure);
    assert!(reports_millis(&message), "{message}");
}

#[test]
fn test_failed_command_sync_still_counts_as_reloaded() {
    let dir = ModuleDir::with_modules(&["alpha", "beta"]).unwrap();
    let world = World::new(HostLayout::Nested, dir, ReloadPolicy::default());
    let before = world.instance("alpha");
    world.host.fail_sync();

    let outcome = world
        .orchestrator
        .reload(RecordingRequester::admin("admin"), "")
        .unwrap()
        .blocking_outcome()
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.reloaded, vec!["alpha", "beta"]);
    assert_ne!(world.instance("alpha"), before);
    assert!(world.host.inner().is_module_enabled("alpha"));
}
