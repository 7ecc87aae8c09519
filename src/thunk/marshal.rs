//! Reading and writing structs in guest memory.

use crate::{
    memory::{AccessMode, GuestAddr, GuestMemory},
    thunk::{Direction, StructId, StructThunk},
    Result,
};

impl StructThunk<'_> {
    /// Reads the guest struct `id` at `addr` and returns its host representation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Fault`] if the target-sized range at `addr` may
    /// not be read, plus any error of [`StructThunk::convert`].
    pub fn read_struct(&self, memory: &GuestMemory, id: StructId, addr: GuestAddr) -> Result<Vec<u8>> {
        let size = self.registry().get(id)?.target().size;
        memory.with_read(addr, size, |bytes| self.convert(id, Direction::ToHost, bytes))?
    }

    /// Converts the host struct `host` to its guest representation and writes
    /// it at `addr`.
    ///
    /// Guest memory is only written if the conversion succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Fault`] if the target-sized range at `addr` may
    /// not be written, plus any error of [`StructThunk::convert`].
    pub fn write_struct(
        &self,
        memory: &mut GuestMemory,
        id: StructId,
        addr: GuestAddr,
        host: &[u8],
    ) -> Result<()> {
        let guest = self.convert(id, Direction::ToTarget, host)?;
        memory.with_lease(addr, guest.len(), AccessMode::WRITE, false, |bytes| {
            bytes.copy_from_slice(&guest);
        })
    }
}
