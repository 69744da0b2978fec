//! Patch table: native routines substituted in for specific 6502
//! entry addresses, consulted ahead of the code cache on every
//! scheduler iteration.

use std::collections::HashMap;

use crate::hal::Hal;

/// `None` means "fall through to the compiled routine for this
/// address"; `Some(addr)` is a definite next address, including a
/// negative value standing in for "terminate" the same way a
/// compiled routine's return value does.
pub type Patch = Box<dyn Fn(&mut dyn Hal) -> Option<i32> + Send + Sync>;

#[derive(Default)]
pub struct PatchTable {
    patches: HashMap<u16, Patch>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, entry_address: u16, patch: Patch) {
        self.patches.insert(entry_address, patch);
    }

    pub fn remove(&mut self, entry_address: u16) -> Option<Patch> {
        self.patches.remove(&entry_address)
    }

    pub fn get(&self, entry_address: u16) -> Option<&Patch> {
        self.patches.get(&entry_address)
    }

    pub fn is_installed(&self, entry_address: u16) -> bool {
        self.patches.contains_key(&entry_address)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::memory::{MemoryBus, Ram};
    use crate::regfile::RegisterFile;
    use crate::std_hal::StdHal;

    fn hal_fixture(bus: &mut MemoryBus) {
        bus.attach(Ram::new(0x10000), 0, false).unwrap();
    }

    #[test]
    fn installed_patch_short_circuits_with_its_own_next_address() {
        let mut table = PatchTable::new();
        table.install(0x8000, Box::new(|_hal| Some(0x9000)));

        let mut bus = MemoryBus::new();
        hal_fixture(&mut bus);
        let bus = Rc::new(RefCell::new(bus));
        let mut notify = |_: u16, _: u16| {};
        let mut cancelled = || false;
        let mut poll = || 0u16;
        let mut hal = StdHal::new(RegisterFile::default(), bus, &mut notify, &mut cancelled, &mut poll);

        let patch = table.get(0x8000).unwrap();
        assert_eq!(patch(&mut hal), Some(0x9000));
    }

    #[test]
    fn a_patch_returning_none_falls_through_to_the_cache() {
        let mut table = PatchTable::new();
        table.install(0x8000, Box::new(|_hal| None));

        let mut bus = MemoryBus::new();
        hal_fixture(&mut bus);
        let bus = Rc::new(RefCell::new(bus));
        let mut notify = |_: u16, _: u16| {};
        let mut cancelled = || false;
        let mut poll = || 0u16;
        let mut hal = StdHal::new(RegisterFile::default(), bus, &mut notify, &mut cancelled, &mut poll);

        let patch = table.get(0x8000).unwrap();
        assert_eq!(patch(&mut hal), None);
    }

    #[test]
    fn an_unpatched_address_has_no_entry() {
        let table = PatchTable::new();
        assert!(!table.is_installed(0x1234));
        assert!(table.get(0x1234).is_none());
    }

    #[test]
    fn removing_a_patch_makes_the_address_fall_through_again() {
        let mut table = PatchTable::new();
        table.install(0x8000, Box::new(|_hal| Some(0x1)));
        assert!(table.remove(0x8000).is_some());
        assert!(table.get(0x8000).is_none());
    }
}
