//! Unregistration properties over a spread of manifests and both layouts

use fastswap_kernel::{ModuleManifest, PermissionDefault, RegistryHandle};
use fastswap_runtime::hot_reload::{locate_registry, unregister};
use fastswap_runtime::{EmbeddedHost, HostLayout};
use fastswap_testing::ModuleDir;
use std::sync::Arc;

fn manifests() -> Vec<ModuleManifest> {
    vec![
        ModuleManifest::new("Economy Plus", "eco::Main")
            .with_command("balance", &["bal", "money"])
            .with_command("pay", &["give"])
            .with_provides("Vault")
            .with_provides("EcoAPI")
            .with_permission("eco.balance", PermissionDefault::True)
            .with_permission("eco.admin", PermissionDefault::Op),
        ModuleManifest::new("worldedit", "we::Main")
            .with_command("wand", &[])
            .with_command("pos", &["p", "position"])
            .with_permission("we.wand", PermissionDefault::NotOp),
        ModuleManifest::new("quiet", "quiet::Main"),
        // Shares labels with the modules above; loads last so only its
        // qualified forms are registered.
        ModuleManifest::new("shadow", "shadow::Main")
            .with_command("balance", &["bal"])
            .with_command("wand", &[]),
    ]
}

fn boot(layout: HostLayout) -> (ModuleDir, Arc<EmbeddedHost>, Arc<dyn RegistryHandle>) {
    let dir = ModuleDir::new().unwrap();
    for (i, manifest) in manifests().iter().enumerate() {
        dir.write(&format!("{}-{}.zip", i, manifest.name.replace(' ', "_")), manifest)
            .unwrap();
    }
    let host = Arc::new(EmbeddedHost::new(layout, dir.path()));
    assert!(host.bootstrap().failures.is_empty());
    let registry = locate_registry(host.clone());
    (dir, host, registry)
}

#[test]
fn test_no_command_form_resolves_after_unregister() {
    for layout in [HostLayout::Flat, HostLayout::Nested] {
        for manifest in manifests() {
            let (_dir, host, registry) = boot(layout);
            let module = registry.find_module(&manifest.name).unwrap();
            if let Some(label) = manifest.command_labels().next() {
                host.register_runtime_alias(&module, label, "extra-alias").unwrap();
            }
            host.register_runtime_command(&module, "runtime-only");

            unregister(&module, registry.as_ref());

            for (label, spec) in &manifest.commands {
                let mut names = vec![label.clone()];
                names.extend(spec.aliases.iter().cloned());
                for name in names {
                    let qualified = module.qualified(&name);
                    assert!(registry.command_binding(&qualified).is_none(), "{qualified}");
                    if let Some(binding) = registry.command_binding(&name) {
                        assert!(!binding.is_owned_by(&manifest.name), "{name}");
                    }
                }
            }
            assert!(
                registry
                    .command_entries()
                    .iter()
                    .all(|(_, binding)| !binding.is_owned_by(&manifest.name)),
                "{} left commands behind",
                manifest.name
            );
        }
    }
}

#[test]
fn test_no_lookup_name_remains() {
    for layout in [HostLayout::Flat, HostLayout::Nested] {
        for manifest in manifests() {
            let (_dir, _host, registry) = boot(layout);
            let module = registry.find_module(&manifest.name).unwrap();

            unregister(&module, registry.as_ref());

            assert!(registry.lookup(&manifest.name).is_none());
            for provided in &manifest.provides {
                assert!(registry.lookup(provided).is_none(), "{provided}");
            }
            for permission in manifest.declared_permissions() {
                assert!(registry.permission(&permission.name).is_none());
                for operator in [true, false] {
                    assert!(!registry.default_bucket(operator).contains(&permission));
                }
            }
            assert!(registry.find_module(&manifest.name).is_none());
        }
    }
}

#[test]
fn test_other_modules_keep_their_entries() {
    let (_dir, host, registry) = boot(HostLayout::Nested);
    let economy = registry.find_module("Economy Plus").unwrap();

    unregister(&economy, registry.as_ref());

    assert!(host.dispatch("shadow:balance").is_some());
    assert!(host.dispatch("shadow:bal").is_some());
    assert!(host.dispatch("wand").unwrap().is_owned_by("worldedit"));
    assert!(registry.lookup("worldedit").is_some());
    assert!(registry.permission("we.wand").is_some());
    assert_eq!(registry.list_modules().len(), 3);
}

#[test]
fn test_second_unregister_changes_nothing() {
    for layout in [HostLayout::Flat, HostLayout::Nested] {
        let (_dir, _host, registry) = boot(layout);
        let module = registry.find_module("worldedit").unwrap();

        assert!(!unregister(&module, registry.as_ref()).is_empty());
        let commands = registry.command_entries().len();
        let modules = registry.list_modules().len();

        let again = unregister(&module, registry.as_ref());
        assert!(again.is_empty());
        assert_eq!(registry.command_entries().len(), commands);
        assert_eq!(registry.list_modules().len(), modules);
    }
}
