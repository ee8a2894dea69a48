//! Registry probing and degraded operation

use fastswap_kernel::{Notice, RegistryVariant, ReloadError, ReloadMode, ReloadPolicy};
use fastswap_runtime::hot_reload::locate_registry;
use fastswap_runtime::{ChatTrigger, CommandTrigger, EmbeddedHost, HostLayout, ReloadOrchestrator};
use fastswap_testing::{
    CountingHost, InlineScheduler, ModuleDir, RecordingRequester, assert_notified,
};
use std::sync::Arc;

#[test]
fn test_probe_selects_variant_by_layout() {
    let dir = ModuleDir::with_modules(&["alpha"]).unwrap();
    for (layout, variant) in [
        (HostLayout::Flat, RegistryVariant::Flat),
        (HostLayout::Nested, RegistryVariant::Nested),
    ] {
        let host = Arc::new(EmbeddedHost::new(layout, dir.path()));
        host.bootstrap();
        let registry = locate_registry(host);
        assert_eq!(registry.variant(), variant);
        assert!(registry.is_available());
        assert_eq!(registry.list_modules().len(), 1);
    }
}

#[test]
fn test_hidden_storage_degrades_to_full_reload_only() {
    let dir = ModuleDir::with_modules(&["alpha", "beta"]).unwrap();
    let embedded = Arc::new(EmbeddedHost::new(HostLayout::Nested, dir.path()));
    embedded.bootstrap();
    let host = CountingHost::new(embedded);
    host.hide_storage();

    let orchestrator =
        ReloadOrchestrator::builder(host.clone(), Arc::new(InlineScheduler::new()), dir.path())
            .build();
    assert_eq!(orchestrator.registry().variant(), RegistryVariant::Unavailable);
    let admin = RecordingRequester::admin("admin");

    for target in ["", "alpha"] {
        let result = orchestrator
            .reload(admin.clone(), target)
            .unwrap()
            .blocking_outcome();
        assert!(matches!(result, Err(ReloadError::RegistryUnavailable)));
    }
    assert_eq!(host.calls().lifecycle(), 0);
    assert_notified!(admin, Notice::Failure, "unavailable");
    assert_eq!(orchestrator.install_trigger_commands(), 0);

    orchestrator.apply_policy(
        ReloadPolicy::new()
            .with_mode(ReloadMode::Full)
            .with_auto_reload(false),
    );
    orchestrator
        .reload(admin.clone(), "")
        .unwrap()
        .blocking_outcome()
        .unwrap();
    assert_eq!(host.calls().full_reload, 1);
}

#[test]
fn test_installed_triggers_route_to_orchestrator() {
    let dir = ModuleDir::with_modules(&["alpha", "beta"]).unwrap();
    let host = Arc::new(EmbeddedHost::new(HostLayout::Flat, dir.path()));
    host.bootstrap();
    let orchestrator =
        ReloadOrchestrator::builder(host.clone(), Arc::new(InlineScheduler::new()), dir.path())
            .with_policy(ReloadPolicy::new().with_auto_reload(false))
            .build();
    let syncs = host.command_syncs();

    assert_eq!(orchestrator.install_trigger_commands(), 6);
    assert!(host.command_syncs() > syncs);

    let binding = host.dispatch("fastswap:rl").unwrap();
    assert!(CommandTrigger::matches(binding.label()));
    assert_eq!(binding.permission(), Some("fastswap.use"));

    let before = host.module("beta").unwrap().instance_id();
    let admin = RecordingRequester::admin("admin");
    CommandTrigger::new(Arc::clone(&orchestrator))
        .on_command(admin.clone(), &["beta"])
        .unwrap()
        .blocking_outcome()
        .unwrap();
    assert_ne!(host.module("beta").unwrap().instance_id(), before);

    // Triggers survive module reloads; they belong to fastswap.
    assert!(host.dispatch("reload").unwrap().is_owned_by("fastswap"));

    let chat = ChatTrigger::new(orchestrator);
    assert!(chat.on_chat(admin.clone(), "reload"));
    assert_notified!(admin, Notice::Success, "reloaded all modules");
}
