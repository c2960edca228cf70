//! Module manager: load, start, stop, unload, hot-swap (§4.C).

// Layer 2: Third-party crate imports
use chrono::Utc; // §3.2 convention

// Layer 3: Internal module imports
use super::header::{ModuleFlags, ModuleHeader, HEADER_SIZE, MAX_IMAGE_SIZE};
use super::types::{Dependency, Module, ModuleRegion, ModuleState};
use crate::collaborators::{Heap, LogLevel, LogSink, ModuleRuntime};
use crate::error::{KernelError, KernelResult};
use crate::ids::{ModuleId, SandboxId};

const DEPENDENCY_ENTRY_SIZE: usize = 64 + 4 + 4 + 1 + 3; // name, min, max, optional, pad
const SYMBOL_ENTRY_SIZE: usize = 64 + 4; // name, offset

/// The module table (§4.C).
#[derive(Debug)]
pub struct ModuleManager {
    slots: Vec<Option<Module>>,
    load_error_count: u32,
}

impl ModuleManager {
    /// Build a table with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            load_error_count: 0,
        }
    }

    /// System-wide count of entry-point failures across every module
    /// (§4.D step 3: "the module manager's load-error counter").
    pub fn load_error_count(&self) -> u32 {
        self.load_error_count
    }

    /// Read access to a module's record.
    pub fn get(&self, id: ModuleId) -> KernelResult<&Module> {
        self.slots
            .get(id.as_index() as usize)
            .and_then(Option::as_ref)
            .ok_or(KernelError::UnknownId)
    }

    fn get_mut(&mut self, id: ModuleId) -> KernelResult<&mut Module> {
        self.slots
            .get_mut(id.as_index() as usize)
            .and_then(Option::as_mut)
            .ok_or(KernelError::UnknownId)
    }

    /// Find a module by name, in any state.
    pub fn module_find(&self, name: &str) -> Option<&Module> {
        self.slots.iter().flatten().find(|module| module.name == name)
    }

    /// All currently occupied module slots.
    pub fn module_list(&self) -> Vec<&Module> {
        self.slots.iter().flatten().collect()
    }

    /// First-match symbol lookup across every loaded module (§4.C
    /// "purely advisory"; implemented for real rather than as a no-op,
    /// since the lookup itself carries no cross-module call semantics).
    pub fn module_resolve_symbol(&self, name: &str) -> Option<u32> {
        self.slots
            .iter()
            .flatten()
            .find_map(|module| module.symbols.iter().find(|(sym, _)| sym == name).map(|(_, addr)| *addr))
    }

    /// Validate a raw image and return its parsed header (§4.C step 1).
    pub fn module_validate(&self, image: &[u8]) -> KernelResult<ModuleHeader> {
        if image.len() > MAX_IMAGE_SIZE {
            return Err(KernelError::InvalidImage("image exceeds 1 MiB".to_string()));
        }
        let header = ModuleHeader::parse(image)
            .ok_or_else(|| KernelError::InvalidImage("bad magic or header version".to_string()))?;

        let code_size = header.code_size as usize;
        let data_size = header.data_size as usize;
        let bss_size = header.bss_size as usize;
        if code_size > MAX_IMAGE_SIZE || data_size > MAX_IMAGE_SIZE || bss_size > MAX_IMAGE_SIZE {
            return Err(KernelError::InvalidImage("section exceeds 1 MiB".to_string()));
        }
        if image.len() < HEADER_SIZE + code_size + data_size {
            return Err(KernelError::InvalidImage(
                "image shorter than header + code + data".to_string(),
            ));
        }
        Ok(header)
    }

    fn parse_dependencies(&self, image: &[u8], header: &ModuleHeader) -> Vec<Dependency> {
        let mut out = Vec::with_capacity(header.dependency_count as usize);
        let base = header.dependency_table_offset as usize;
        for i in 0..header.dependency_count as usize {
            let offset = base + i * DEPENDENCY_ENTRY_SIZE;
            if offset + DEPENDENCY_ENTRY_SIZE > image.len() {
                break;
            }
            let name_bytes = &image[offset..offset + 64];
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(64);
            let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
            let min_version = u32::from_le_bytes(image[offset + 64..offset + 68].try_into().unwrap_or([0; 4]));
            let max_version = u32::from_le_bytes(image[offset + 68..offset + 72].try_into().unwrap_or([0; 4]));
            let optional = image[offset + 72] != 0;
            out.push(Dependency {
                name,
                min_version,
                max_version,
                optional,
            });
        }
        out
    }

    fn parse_symbols(&self, image: &[u8], header: &ModuleHeader) -> Vec<(String, u32)> {
        let mut out = Vec::with_capacity(header.symbol_count as usize);
        let base = header.symbol_table_offset as usize;
        for i in 0..header.symbol_count as usize {
            let offset = base + i * SYMBOL_ENTRY_SIZE;
            if offset + SYMBOL_ENTRY_SIZE > image.len() {
                break;
            }
            let name_bytes = &image[offset..offset + 64];
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(64);
            let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
            let addr = u32::from_le_bytes(image[offset + 64..offset + 68].try_into().unwrap_or([0; 4]));
            out.push((name, addr));
        }
        out
    }

    /// Resolve `dependencies` against currently loaded modules, pushing
    /// `dependent` into each satisfied provider's `dependents` list.
    /// Rolls back every already-recorded dependent on the first
    /// unresolved non-optional dependency (§4.C "Dependency resolution").
    fn resolve_dependencies(
        &mut self,
        dependent: ModuleId,
        dependencies: &[Dependency],
    ) -> KernelResult<()> {
        let mut resolved: Vec<ModuleId> = Vec::new();
        for dep in dependencies {
            let provider_id = self
                .slots
                .iter()
                .flatten()
                .find(|m| {
                    m.name == dep.name
                        && matches!(m.state, ModuleState::Loaded | ModuleState::Running)
                        && dep.satisfied_by(m.version)
                })
                .map(|m| m.id);

            match provider_id {
                Some(id) => {
                    if let Ok(provider) = self.get_mut(id) {
                        provider.dependents.push(dependent);
                    }
                    resolved.push(id);
                }
                None if dep.optional => {}
                None => {
                    for id in resolved {
                        if let Ok(provider) = self.get_mut(id) {
                            provider.dependents.retain(|&d| d != dependent);
                        }
                    }
                    return Err(KernelError::DependencyUnsatisfied(dep.name.clone()));
                }
            }
        }
        Ok(())
    }

    fn unresolve_dependencies(&mut self, dependent: ModuleId, dependencies: &[Dependency]) {
        for dep in dependencies {
            if let Some(provider) = self
                .slots
                .iter_mut()
                .flatten()
                .find(|m| m.name == dep.name)
            {
                provider.dependents.retain(|&d| d != dependent);
            }
        }
    }

    /// Load, validate, and (if `auto-start` is set) start a module image
    /// (§4.C "Load procedure"). The returned module's `sandbox_id` shares
    /// its numeric value with the module id (§3 Sandbox context); the
    /// caller is responsible for creating the matching sandbox entry.
    pub fn module_load(
        &mut self,
        image: &[u8],
        heap: &mut dyn Heap,
        runtime: &mut dyn ModuleRuntime,
        log: &dyn LogSink,
    ) -> KernelResult<ModuleId> {
        let header = self.module_validate(image)?;

        if let Some(existing) = self.module_find(&header.name) {
            if existing.blocks_name_reuse() {
                return Err(KernelError::AlreadyLoaded);
            }
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::NoFreeSlot)?;
        let id = ModuleId::from_index(index as u32);

        let total = header.code_size as usize + header.data_size as usize + header.bss_size as usize;
        let base = match heap.kmalloc(total) {
            Some(base) => base,
            None => return Err(KernelError::OutOfMemory),
        };

        let dependencies = self.parse_dependencies(image, &header);
        let symbols = self.parse_symbols(image, &header);

        if let Err(err) = self.resolve_dependencies(id, &dependencies) {
            heap.kfree(base);
            return Err(err);
        }

        self.slots[index] = Some(Module {
            id,
            name: header.name.clone(),
            version: header.module_version,
            state: ModuleState::Loaded,
            module_type: header.module_type,
            flags: header.flags,
            region: ModuleRegion {
                base,
                code_size: header.code_size,
                data_size: header.data_size,
                bss_size: header.bss_size,
            },
            entry_point_offset: header.entry_point_offset,
            exit_point_offset: header.exit_point_offset,
            dependencies,
            dependents: Vec::new(),
            reference_count: 0,
            symbols,
            cpu_ticks: 0,
            memory_allocated: total,
            call_count: 0,
            error_count: 0,
            behavior_score: 100,
            sandbox_id: SandboxId::from_index(index as u32),
            loaded_at: Utc::now(),
            swap_count: 0,
        });
        log.log(LogLevel::Info, &format!("{id} loaded ({})", header.name));

        if header.flags.contains(ModuleFlags::AUTO_START) {
            self.module_start(id, runtime, log)?;
        }
        Ok(id)
    }

    /// Start a `Loaded` module by invoking its entry function (§4.C).
    pub fn module_start(
        &mut self,
        id: ModuleId,
        runtime: &mut dyn ModuleRuntime,
        log: &dyn LogSink,
    ) -> KernelResult<()> {
        let (entry_offset, state) = {
            let module = self.get(id)?;
            (module.entry_point_offset, module.state)
        };
        if state != ModuleState::Loaded {
            return Err(KernelError::InvalidState);
        }

        let result = runtime.invoke_entry(id, entry_offset);
        if result == 0 {
            self.get_mut(id)?.state = ModuleState::Running;
        } else {
            self.load_error_count += 1;
            let module = self.get_mut(id)?;
            module.state = ModuleState::Error;
            module.error_count += 1;
            log.log(LogLevel::Error, &format!("{id} entry returned {result}"));
        }
        Ok(())
    }

    /// Stop a `Running` module by invoking its exit function (§4.C).
    pub fn module_stop(&mut self, id: ModuleId, runtime: &mut dyn ModuleRuntime) -> KernelResult<()> {
        let (exit_offset, state) = {
            let module = self.get(id)?;
            (module.exit_point_offset, module.state)
        };
        if state != ModuleState::Running {
            return Err(KernelError::InvalidState);
        }
        runtime.invoke_exit(id, exit_offset);
        self.get_mut(id)?.state = ModuleState::Loaded;
        Ok(())
    }

    /// Suspend a `Running` or `Loaded` module (explicit request or
    /// anomaly intervention, §4.D).
    pub fn module_suspend(&mut self, id: ModuleId) -> KernelResult<()> {
        let module = self.get_mut(id)?;
        if !matches!(module.state, ModuleState::Running | ModuleState::Loaded) {
            return Err(KernelError::InvalidState);
        }
        module.state = ModuleState::Suspended;
        Ok(())
    }

    /// Resume a `Suspended` module back to `Loaded` (the caller must
    /// `module_start` again to reach `Running`; suspension does not
    /// remember the pre-suspend state at this design level).
    pub fn module_resume(&mut self, id: ModuleId) -> KernelResult<()> {
        let module = self.get_mut(id)?;
        if module.state != ModuleState::Suspended {
            return Err(KernelError::InvalidState);
        }
        module.state = ModuleState::Loaded;
        Ok(())
    }

    /// Unload a module: refused with `InUse` if it has dependents or is
    /// flagged `core`; otherwise stops it (if `Running`) and releases
    /// its region and slot (§4.C "Stop / unload").
    pub fn module_unload(
        &mut self,
        id: ModuleId,
        heap: &mut dyn Heap,
        runtime: &mut dyn ModuleRuntime,
    ) -> KernelResult<()> {
        let module = self.get(id)?;
        if !module.dependents.is_empty() || module.flags.contains(ModuleFlags::CORE) {
            return Err(KernelError::InUse);
        }

        if module.state == ModuleState::Running {
            self.module_stop(id, runtime)?;
        }

        let module = self.get(id)?;
        let base = module.region.base;
        let dependencies = module.dependencies.clone();
        self.unresolve_dependencies(id, &dependencies);

        heap.kfree(base);
        self.slots[id.as_index() as usize] = None;
        Ok(())
    }

    /// Hot-swap a `Running`/`Loaded` module's image in place (§4.C
    /// "Hot-swap"). Permitted only when `hot-swap` is flagged. On any
    /// failure the old region is restored and the module moves to
    /// `Error`; dependents are not re-resolved.
    pub fn module_hot_swap(
        &mut self,
        id: ModuleId,
        new_image: &[u8],
        heap: &mut dyn Heap,
        runtime: &mut dyn ModuleRuntime,
        log: &dyn LogSink,
    ) -> KernelResult<()> {
        let (old_name, old_base, was_running, hot_swappable) = {
            let module = self.get(id)?;
            (
                module.name.clone(),
                module.region.base,
                module.state == ModuleState::Running,
                module.flags.contains(ModuleFlags::HOT_SWAP),
            )
        };
        if !hot_swappable {
            return Err(KernelError::InvalidState);
        }

        let header = match self.module_validate(new_image) {
            Ok(header) => header,
            Err(err) => {
                self.get_mut(id)?.state = ModuleState::Error;
                return Err(err);
            }
        };
        if header.name != old_name {
            self.get_mut(id)?.state = ModuleState::Error;
            return Err(KernelError::InvalidImage(
                "hot-swap image declares a different name".to_string(),
            ));
        }

        self.get_mut(id)?.state = ModuleState::Suspended;
        if was_running {
            let exit_offset = self.get(id)?.exit_point_offset;
            runtime.invoke_exit(id, exit_offset);
        }

        let total = header.code_size as usize + header.data_size as usize + header.bss_size as usize;
        let new_base = match heap.kmalloc(total) {
            Some(base) => base,
            None => {
                self.load_error_count += 1;
                let module = self.get_mut(id)?;
                module.state = ModuleState::Error;
                module.error_count += 1;
                return Err(KernelError::OutOfMemory);
            }
        };

        let entry_offset = header.entry_point_offset;
        let start_result = runtime.invoke_entry(id, entry_offset);
        let new_symbols = self.parse_symbols(new_image, &header);

        if start_result != 0 {
            heap.kfree(new_base);
            self.load_error_count += 1;
            let module = self.get_mut(id)?;
            module.state = ModuleState::Error;
            module.error_count += 1;
            return Err(KernelError::InvalidImage("new image entry failed".to_string()));
        }

        let module = self.get_mut(id)?;
        module.version = header.module_version;
        module.region = ModuleRegion {
            base: new_base,
            code_size: header.code_size,
            data_size: header.data_size,
            bss_size: header.bss_size,
        };
        module.entry_point_offset = header.entry_point_offset;
        module.exit_point_offset = header.exit_point_offset;
        module.symbols = new_symbols;
        module.swap_count += 1;
        module.state = ModuleState::Running;

        heap.kfree(old_base);
        log.log(LogLevel::Info, &format!("{id} hot-swapped to v{}", header.module_version));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CapturingLogSink, InMemoryHeap, StubModuleRuntime};
    use crate::module::header::{ModuleHeader, ModuleType};

    fn header(name: &str, version: u32, flags: ModuleFlags) -> ModuleHeader {
        ModuleHeader {
            module_version: version,
            name: name.to_string(),
            description: String::new(),
            author: String::new(),
            license: String::new(),
            module_type: ModuleType::Driver,
            priority: 2,
            flags,
            code_size: 4,
            data_size: 0,
            bss_size: 0,
            entry_point_offset: 0,
            exit_point_offset: 0,
            symbol_count: 0,
            symbol_table_offset: 0,
            dependency_count: 0,
            dependency_table_offset: 0,
            checksum: 0,
            signature: 0,
        }
    }

    fn image(header: &ModuleHeader) -> Vec<u8> {
        let mut bytes = header.encode();
        bytes.extend(std::iter::repeat(0xAA).take(header.code_size as usize));
        bytes.extend(std::iter::repeat(0xBB).take(header.data_size as usize));
        bytes
    }

    /// Build an image for `header` declaring one dependency entry
    /// `(dep_name, min_version, max_version, optional)` appended after
    /// the code section.
    fn image_with_dependency(
        mut header: ModuleHeader,
        dep_name: &str,
        min_version: u32,
        max_version: u32,
        optional: bool,
    ) -> Vec<u8> {
        header.dependency_count = 1;
        let mut bytes = header.encode();
        bytes.extend(std::iter::repeat(0xAA).take(header.code_size as usize));
        let dep_offset = bytes.len();
        bytes.resize(dep_offset + DEPENDENCY_ENTRY_SIZE, 0);
        let name_bytes = dep_name.as_bytes();
        bytes[dep_offset..dep_offset + name_bytes.len()].copy_from_slice(name_bytes);
        bytes[dep_offset + 64..dep_offset + 68].copy_from_slice(&min_version.to_le_bytes());
        bytes[dep_offset + 68..dep_offset + 72].copy_from_slice(&max_version.to_le_bytes());
        bytes[dep_offset + 72] = optional as u8;

        header.dependency_table_offset = dep_offset as u32;
        let mut final_bytes = header.encode();
        final_bytes.extend_from_slice(&bytes[HEADER_SIZE..]);
        final_bytes
    }

    #[test]
    fn load_then_validate_boundary_rejects_oversized_sections() {
        let mut manager = ModuleManager::new(4);
        let mut bad = header("mod_x", 1, ModuleFlags::empty());
        bad.code_size = 10;
        let mut bytes = bad.encode();
        // Declares 10 bytes of code but the image is shorter than header + code.
        bytes.truncate(HEADER_SIZE + 2);
        assert!(matches!(
            manager.module_validate(&bytes),
            Err(KernelError::InvalidImage(_))
        ));
    }

    #[test]
    fn load_auto_starts_when_flagged() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();
        let h = header("mod_timer", 1, ModuleFlags::AUTO_START | ModuleFlags::HOT_SWAP);
        let bytes = image(&h);

        let id = manager
            .module_load(&bytes, &mut heap, &mut runtime, &log)
            .expect("loads");
        assert_eq!(manager.get(id).expect("exists").state, ModuleState::Running);
    }

    #[test]
    fn duplicate_name_in_non_unloaded_state_is_rejected() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();
        let h = header("mod_dup", 1, ModuleFlags::empty());
        let bytes = image(&h);

        manager
            .module_load(&bytes, &mut heap, &mut runtime, &log)
            .expect("first load");
        let second = manager.module_load(&bytes, &mut heap, &mut runtime, &log);
        assert_eq!(second, Err(KernelError::AlreadyLoaded));
    }

    #[test]
    fn unload_refused_with_dependents() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();

        let provider = image(&header("mod_heap", 1, ModuleFlags::empty()));
        let provider_id = manager
            .module_load(&provider, &mut heap, &mut runtime, &log)
            .expect("loads");

        let dependent_header = header("mod_alloc", 1, ModuleFlags::empty());
        let bytes = image_with_dependency(dependent_header, "mod_heap", 1, 1, false);

        manager
            .module_load(&bytes, &mut heap, &mut runtime, &log)
            .expect("dependent loads and resolves");

        assert_eq!(manager.get(provider_id).expect("exists").dependents.len(), 1);
        assert_eq!(
            manager.module_unload(provider_id, &mut heap, &mut runtime),
            Err(KernelError::InUse)
        );
    }

    #[test]
    fn entry_failure_increments_system_wide_load_error_count() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();
        let h = header("mod_bad", 1, ModuleFlags::empty());
        let id = manager
            .module_load(&image(&h), &mut heap, &mut runtime, &log)
            .expect("loads");
        runtime.fail_entry(id, 1);

        manager.module_start(id, &mut runtime, &log).expect("call completes");
        assert_eq!(manager.get(id).expect("exists").state, ModuleState::Error);
        assert_eq!(manager.load_error_count(), 1);
    }

    #[test]
    fn unresolved_non_optional_dependency_fails_load() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();

        let h = header("mod_net", 1, ModuleFlags::empty());
        let bytes = image_with_dependency(h, "mod_ghost", 1, 1, false);

        let result = manager.module_load(&bytes, &mut heap, &mut runtime, &log);
        assert_eq!(result, Err(KernelError::DependencyUnsatisfied("mod_ghost".to_string())));
    }

    #[test]
    fn hot_swap_updates_version_and_increments_swap_count() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();
        let v1 = header("mod_timer", 1, ModuleFlags::AUTO_START | ModuleFlags::HOT_SWAP);
        let id = manager
            .module_load(&image(&v1), &mut heap, &mut runtime, &log)
            .expect("loads");

        let v2 = header("mod_timer", 2, ModuleFlags::AUTO_START | ModuleFlags::HOT_SWAP);
        manager
            .module_hot_swap(id, &image(&v2), &mut heap, &mut runtime, &log)
            .expect("swaps");

        let module = manager.get(id).expect("exists");
        assert_eq!(module.version, 2);
        assert_eq!(module.swap_count, 1);
        assert_eq!(module.state, ModuleState::Running);
        assert_eq!(manager.module_find("mod_timer").expect("found").version, 2);
    }

    #[test]
    fn hot_swap_oom_transitions_to_error_and_counts_the_failure() {
        let mut manager = ModuleManager::new(4);
        // Exactly enough budget for the old region alone: the old region
        // is still live when the new region is requested, so the second
        // `kmalloc` must fail.
        let mut heap = InMemoryHeap::new(4);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();
        let v1 = header("mod_timer", 1, ModuleFlags::AUTO_START | ModuleFlags::HOT_SWAP);
        let id = manager
            .module_load(&image(&v1), &mut heap, &mut runtime, &log)
            .expect("loads");

        let v2 = header("mod_timer", 2, ModuleFlags::AUTO_START | ModuleFlags::HOT_SWAP);
        let result = manager.module_hot_swap(id, &image(&v2), &mut heap, &mut runtime, &log);

        assert_eq!(result, Err(KernelError::OutOfMemory));
        let module = manager.get(id).expect("exists");
        assert_eq!(module.state, ModuleState::Error);
        assert_eq!(module.error_count, 1);
        assert_eq!(manager.load_error_count(), 1);
    }

    #[test]
    fn hot_swap_refused_without_flag() {
        let mut manager = ModuleManager::new(4);
        let mut heap = InMemoryHeap::new(1 << 20);
        let mut runtime = StubModuleRuntime::new();
        let log = CapturingLogSink::new();
        let v1 = header("mod_fixed", 1, ModuleFlags::AUTO_START);
        let id = manager
            .module_load(&image(&v1), &mut heap, &mut runtime, &log)
            .expect("loads");

        let v2 = header("mod_fixed", 2, ModuleFlags::AUTO_START);
        assert_eq!(
            manager.module_hot_swap(id, &image(&v2), &mut heap, &mut runtime, &log),
            Err(KernelError::InvalidState)
        );
    }
}
