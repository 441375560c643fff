// SPDX-License-Identifier: GPL-3.0-only

//! Helper module bookkeeping
//!
//! Some device types need a helper module loaded while they are the active
//! route (a loopback for a headset, for example). At most one such module is
//! tracked per [`Direction`]. The actual loading goes through a [`ModuleHost`].

use super::device::{DeviceData, DeviceRuleTable};
use super::types::{Direction, ModuleSpec};
use crate::constants::DeviceFlags;
use crate::errors::ModuleError;
use tracing::{debug, info, warn};

/// Host side index of a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleIndex(pub u32);

impl std::fmt::Display for ModuleIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loads and unloads modules in the audio server
pub trait ModuleHost {
    fn load(&mut self, name: &str, args: Option<&str>) -> Result<ModuleIndex, ModuleError>;

    /// Unload right away
    fn unload(&mut self, index: ModuleIndex);

    /// Ask the server to unload the module once it is safe to do so
    fn request_unload(&mut self, index: ModuleIndex);
}

/// Module currently tracked for a direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    index: ModuleIndex,
    spec: ModuleSpec,
    flags: DeviceFlags,
}

impl LoadedModule {
    pub fn index(&self) -> ModuleIndex {
        self.index
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleLoadCoordinator {
    slots: [Option<LoadedModule>; 2],
}

impl ModuleLoadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self, direction: Direction) -> Option<&LoadedModule> {
        self.slots[direction.index()].as_ref()
    }

    /// Bring the module of `direction` in line with `data`.
    ///
    /// A tracked module whose name and arguments differ from `data` is
    /// unloaded first. If `data` names a module and none is tracked, it is
    /// loaded. Returns the index of the module tracked afterwards.
    pub fn update(
        &mut self,
        direction: Direction,
        data: &DeviceData,
        host: &mut dyn ModuleHost,
    ) -> Result<Option<ModuleIndex>, ModuleError> {
        let wanted = data.module();

        let stale = self.slots[direction.index()]
            .as_ref()
            .is_some_and(|loaded| Some(&loaded.spec) != wanted);
        if stale {
            self.unload(direction, host);
        }

        let slot = &mut self.slots[direction.index()];
        if let Some(spec) = wanted.filter(|_| slot.is_none()) {
            debug!(%direction, module = %spec, "load module");

            let index = host
                .load(&spec.name, spec.args.as_deref())
                .inspect_err(|err| warn!(%direction, %err, "module load failed"))?;

            info!(%direction, module = %spec, %index, "module loaded");
            *slot = Some(LoadedModule {
                index,
                spec: spec.clone(),
                flags: data.flags(),
            });
        }

        Ok(slot.as_ref().map(|loaded| loaded.index))
    }

    /// Unload the module of `direction` when the newly active type does not
    /// use the same module. Returns whether a module was unloaded.
    pub fn reconcile_on_type_change(
        &mut self,
        direction: Direction,
        type_label: &str,
        table: &DeviceRuleTable,
        host: &mut dyn ModuleHost,
    ) -> bool {
        let Some(loaded) = self.loaded(direction) else {
            return false;
        };
        let Some(rule) = table.get(type_label) else {
            return false;
        };

        if rule.data().module() == Some(&loaded.spec) {
            debug!(%direction, type_label, module = %loaded.spec, "module still required");
            return false;
        }

        self.unload(direction, host);
        true
    }

    /// Forget the module of `direction` without touching the host
    pub fn invalidate(&mut self, direction: Direction) -> Option<LoadedModule> {
        self.slots[direction.index()].take()
    }

    /// The host reports that module `index` went away
    pub fn module_unlinked(&mut self, index: ModuleIndex) -> Option<Direction> {
        let direction = Direction::ALL
            .into_iter()
            .find(|d| self.loaded(*d).is_some_and(|m| m.index == index))?;

        if let Some(loaded) = self.invalidate(direction) {
            debug!(%direction, module = %loaded.spec, "module unlinked");
        }
        Some(direction)
    }

    /// Unload every tracked module
    pub fn shutdown(&mut self, host: &mut dyn ModuleHost) {
        for slot in &mut self.slots {
            if let Some(loaded) = slot.take() {
                debug!(module = %loaded.spec, index = %loaded.index, "unload module on shutdown");
                host.unload(loaded.index);
            }
        }
    }

    fn unload(&mut self, direction: Direction, host: &mut dyn ModuleHost) {
        let Some(loaded) = self.slots[direction.index()].take() else {
            return;
        };

        if loaded.flags.contains(DeviceFlags::MODULE_UNLOAD_IMMEDIATELY) {
            debug!(%direction, module = %loaded.spec, "unload module");
            host.unload(loaded.index);
        } else {
            debug!(%direction, module = %loaded.spec, "unload request for module");
            host.request_unload(loaded.index);
        }
    }
}
