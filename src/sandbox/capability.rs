//! Bit-exact 32-bit capability mask (§6).

// Layer 2: Third-party crate imports
use bitflags::bitflags;

bitflags! {
    /// One named authority a module may exercise (§6 GLOSSARY "Capability").
    ///
    /// Bit values are part of the external interface and are reproduced
    /// exactly from §6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u32 {
        /// Allocate heap memory.
        const MEMORY_ALLOC = 0x01;
        /// Free heap memory.
        const MEMORY_FREE = 0x02;
        /// Map a memory region.
        const MEMORY_MAP = 0x04;
        /// Unmap a memory region.
        const MEMORY_UNMAP = 0x08;
        /// Change a memory region's protection.
        const MEMORY_PROTECT = 0x10;

        /// Create an actor.
        const SCHEDULER_CREATE = 0x20;
        /// Destroy (terminate) an actor.
        const SCHEDULER_DESTROY = 0x40;
        /// Modify an actor's scheduling parameters.
        const SCHEDULER_MODIFY = 0x80;
        /// Send a message to an actor.
        const SCHEDULER_SIGNAL = 0x100;

        /// Load a module.
        const MODULE_LOAD = 0x200;
        /// Unload a module.
        const MODULE_UNLOAD = 0x400;
        /// Query module metadata.
        const MODULE_QUERY = 0x800;

        /// Write to the VGA text buffer.
        const VGA_WRITE = 0x1000;
        /// Clear the VGA text buffer.
        const VGA_CLEAR = 0x2000;
        /// Move the VGA cursor.
        const VGA_CURSOR = 0x4000;

        /// Raw hardware port I/O.
        const HARDWARE_IO = 0x8000;
        /// Register an interrupt handler.
        const INTERRUPT = 0x10000;
        /// Program the timer.
        const TIMER = 0x20000;

        /// Read a file.
        const FS_READ = 0x40000;
        /// Write a file.
        const FS_WRITE = 0x80000;
        /// Create a file.
        const FS_CREATE = 0x100000;
        /// Delete a file.
        const FS_DELETE = 0x200000;

        /// Send a network packet.
        const NET_SEND = 0x400000;
        /// Receive a network packet.
        const NET_RECV = 0x800000;
        /// Open a network socket.
        const NET_SOCKET = 0x1000000;

        /// Query the behavioral supervisor.
        const AI_QUERY = 0x0200_0000;
        /// Configure the behavioral supervisor.
        const AI_CONFIGURE = 0x0400_0000;

        /// Access debug facilities.
        const DEBUG = 0x0800_0000;
        /// Request a system shutdown.
        const SHUTDOWN = 0x1000_0000;
        /// Override a security decision.
        const SECURITY_OVERRIDE = 0x2000_0000;
    }
}

impl Capability {
    /// Capability set for [`super::types::SecurityLevel::Unrestricted`]: every bit.
    pub fn unrestricted() -> Self {
        Self::all()
    }

    /// Capability set for [`super::types::SecurityLevel::Trusted`] (§6).
    pub fn trusted() -> Self {
        Self::MEMORY_ALLOC
            | Self::MEMORY_FREE
            | Self::SCHEDULER_CREATE
            | Self::SCHEDULER_SIGNAL
            | Self::MODULE_QUERY
            | Self::VGA_WRITE
            | Self::VGA_CLEAR
            | Self::TIMER
            | Self::AI_QUERY
            | Self::DEBUG
    }

    /// Capability set for [`super::types::SecurityLevel::User`] (§6).
    pub fn user() -> Self {
        Self::MEMORY_ALLOC
            | Self::MEMORY_FREE
            | Self::SCHEDULER_SIGNAL
            | Self::MODULE_QUERY
            | Self::VGA_WRITE
            | Self::TIMER
            | Self::AI_QUERY
    }

    /// Capability set for [`super::types::SecurityLevel::Untrusted`] (§6).
    pub fn untrusted() -> Self {
        Self::MEMORY_ALLOC | Self::MEMORY_FREE | Self::MODULE_QUERY
    }

    /// Capability set for [`super::types::SecurityLevel::Quarantine`] (§6):
    /// `ModuleQuery` only.
    pub fn quarantine() -> Self {
        Self::MODULE_QUERY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_values_match_the_external_interface() {
        assert_eq!(Capability::MEMORY_ALLOC.bits(), 0x01);
        assert_eq!(Capability::MEMORY_PROTECT.bits(), 0x10);
        assert_eq!(Capability::SCHEDULER_CREATE.bits(), 0x20);
        assert_eq!(Capability::SCHEDULER_SIGNAL.bits(), 0x100);
        assert_eq!(Capability::MODULE_LOAD.bits(), 0x200);
        assert_eq!(Capability::VGA_WRITE.bits(), 0x1000);
        assert_eq!(Capability::HARDWARE_IO.bits(), 0x8000);
        assert_eq!(Capability::FS_READ.bits(), 0x40000);
        assert_eq!(Capability::NET_SEND.bits(), 0x400000);
        assert_eq!(Capability::AI_QUERY.bits(), 0x0200_0000);
        assert_eq!(Capability::SECURITY_OVERRIDE.bits(), 0x2000_0000);
    }

    #[test]
    fn quarantine_set_is_module_query_only() {
        assert_eq!(Capability::quarantine(), Capability::MODULE_QUERY);
    }

    #[test]
    fn unrestricted_contains_every_bit() {
        assert!(Capability::unrestricted().contains(Capability::SECURITY_OVERRIDE));
        assert!(Capability::unrestricted().contains(Capability::MEMORY_ALLOC));
    }
}
