//! Registry unregistration
//!
//! Strips every trace of a module from the host's bookkeeping: command
//! bindings (labels, live aliases and their qualified forms), lookup names,
//! permissions with their default buckets, and finally the module list entry.

use std::sync::Arc;

use tracing::debug;

use fastswap_kernel::{CommandBinding, Module, RegistryHandle};

/// What [`unregister`] actually removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnregisterReport {
    /// Command-table labels removed
    pub commands: Vec<String>,
    /// Lookup names removed
    pub lookup_names: Vec<String>,
    /// Permission nodes removed from the table or a default bucket
    pub permissions: Vec<String>,
    /// Whether the module list still held the instance
    pub module_removed: bool,
}

impl UnregisterReport {
    /// Nothing was left to remove
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
            && self.lookup_names.is_empty()
            && self.permissions.is_empty()
            && !self.module_removed
    }
}

/// Remove `module` from `registry`.
///
/// Safe to call repeatedly; a second call finds nothing and changes nothing.
/// Must run on the primary thread.
pub fn unregister(module: &Module, registry: &dyn RegistryHandle) -> UnregisterReport {
    let mut report = UnregisterReport::default();

    remove_commands(module, registry, &mut report);

    for key in module.lookup_keys() {
        if registry.remove_lookup_name(&key).is_some() {
            report.lookup_names.push(key);
        }
    }

    for permission in module.manifest().declared_permissions() {
        let in_table = registry.remove_permission(&permission.name).is_some();
        let in_op = registry.remove_from_default_bucket(true, &permission);
        let in_non_op = registry.remove_from_default_bucket(false, &permission);
        if in_table || in_op || in_non_op {
            report.permissions.push(permission.name);
        }
    }

    // Last: cleanup above reads the still-present manifest.
    report.module_removed = registry.remove_module(module);

    debug!(
        module = %module.name(),
        commands = report.commands.len(),
        lookup_names = report.lookup_names.len(),
        permissions = report.permissions.len(),
        module_removed = report.module_removed,
        "Unregistered module"
    );
    report
}

fn remove_commands(module: &Module, registry: &dyn RegistryHandle, report: &mut UnregisterReport) {
    let owner = module.name();

    for (label, spec) in &module.manifest().commands {
        let qualified = module.qualified(label);

        // Aliases come from the live binding so runtime additions go too.
        let live = [label.as_str(), qualified.as_str()]
            .into_iter()
            .filter_map(|key| registry.command_binding(key))
            .find(|binding| binding.is_owned_by(owner));
        let aliases = match &live {
            Some(binding) => binding.aliases(),
            None => spec.aliases.clone(),
        };

        for alias in aliases {
            remove_owned(registry, &alias, owner, report);
            remove_owned(registry, &module.qualified(&alias), owner, report);
        }
        remove_owned(registry, label, owner, report);
        remove_owned(registry, &qualified, owner, report);

        if let Some(binding) = live {
            binding.mark_unregistered();
        }
    }

    // Commands registered at runtime without a manifest entry
    for (label, binding) in registry.command_entries() {
        if binding.is_owned_by(owner) {
            remove_owned(registry, &label, owner, report);
        }
    }
}

/// Remove the binding under `label` unless another module owns it.
fn remove_owned(
    registry: &dyn RegistryHandle,
    label: &str,
    owner: &str,
    report: &mut UnregisterReport,
) {
    let owned = registry
        .command_binding(label)
        .is_some_and(|binding| binding.is_owned_by(owner));
    if !owned {
        return;
    }
    if let Some(binding) = registry.remove_command_binding(label) {
        release(&binding);
        report.commands.push(label.to_string());
    }
}

fn release(binding: &Arc<CommandBinding>) {
    if binding.is_registered() {
        binding.mark_unregistered();
    }
}
