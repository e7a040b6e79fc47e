//! Bounds-checked access to guest linear memory.
//!
//! The guest only ever hands the host offsets and lengths. Every access goes
//! through [`SandboxMemory`], which checks the whole range against the current
//! memory size before touching a byte.

use crate::error::HostError;
use crate::primitives::SENTINEL;

/// Read and write access to a guest's linear memory.
pub trait SandboxMemory {
    /// Current size of the memory in bytes.
    fn size(&self) -> usize;

    /// Fill `buf` from `ptr..ptr + buf.len()`.
    fn read_into(&self, ptr: u32, buf: &mut [u8]) -> Result<(), HostError>;

    /// Copy `buf` to `ptr..ptr + buf.len()`.
    fn write(&mut self, ptr: u32, buf: &[u8]) -> Result<(), HostError>;

    /// Read `len` bytes at `ptr`.
    ///
    /// The range is validated before the buffer is allocated, so a guest cannot
    /// make the host allocate more than its own memory holds.
    fn read(&self, ptr: u32, len: u32) -> Result<Vec<u8>, HostError> {
        let end = (ptr as usize)
            .checked_add(len as usize)
            .ok_or(HostError::OutOfBounds)?;
        if end > self.size() {
            return Err(HostError::OutOfBounds);
        }
        let mut buf = vec![0u8; len as usize];
        self.read_into(ptr, &mut buf)?;
        Ok(buf)
    }

    fn read_array<const N: usize>(&self, ptr: u32) -> Result<[u8; N], HostError> {
        let mut buf = [0u8; N];
        self.read_into(ptr, &mut buf)?;
        Ok(buf)
    }

    fn read_u32(&self, ptr: u32) -> Result<u32, HostError> {
        self.read_array(ptr).map(u32::from_le_bytes)
    }

    fn write_u32(&mut self, ptr: u32, value: u32) -> Result<(), HostError> {
        self.write(ptr, &value.to_le_bytes())
    }

    /// Write `buf` into a guest-provided output buffer.
    ///
    /// `out_len_ptr` holds the buffer capacity on entry and the number of
    /// bytes written on exit. When `allow_skip` is set and `out_ptr` is
    /// [`SENTINEL`] nothing is written. A buffer that does not fit fails with
    /// [`HostError::OutputBufferTooSmall`] and leaves memory untouched.
    fn write_output(
        &mut self,
        out_ptr: u32,
        out_len_ptr: u32,
        buf: &[u8],
        allow_skip: bool,
    ) -> Result<(), HostError> {
        if allow_skip && out_ptr == SENTINEL {
            return Ok(());
        }

        let capacity = self.read_u32(out_len_ptr)?;
        let len = u32::try_from(buf.len()).map_err(|_| HostError::OutputBufferTooSmall)?;
        if len > capacity {
            return Err(HostError::OutputBufferTooSmall);
        }

        self.write(out_ptr, buf)?;
        self.write_u32(out_len_ptr, len)
    }
}

impl SandboxMemory for [u8] {
    fn size(&self) -> usize {
        self.len()
    }

    fn read_into(&self, ptr: u32, buf: &mut [u8]) -> Result<(), HostError> {
        let start = ptr as usize;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or(HostError::OutOfBounds)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, ptr: u32, buf: &[u8]) -> Result<(), HostError> {
        let start = ptr as usize;
        let dst = start
            .checked_add(buf.len())
            .and_then(|end| self.get_mut(start..end))
            .ok_or(HostError::OutOfBounds)?;
        dst.copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn memory(size: usize) -> Vec<u8> {
        vec![0u8; size]
    }

    #[test]
    fn test_read_write_roundtrip() {
        let mut mem = memory(64);
        mem.as_mut_slice().write(10, b"tessera").unwrap();
        assert_eq!(mem.as_slice().read(10, 7).unwrap(), b"tessera");
        assert_eq!(mem.as_slice().read(0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_read_out_of_bounds() {
        let mem = memory(16);
        assert_eq!(mem.as_slice().read(10, 7), Err(HostError::OutOfBounds));
        assert_eq!(mem.as_slice().read(u32::MAX, 2), Err(HostError::OutOfBounds));
        assert_eq!(mem.as_slice().read(0, u32::MAX), Err(HostError::OutOfBounds));
        assert_eq!(mem.as_slice().read(16, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_write_out_of_bounds_leaves_memory_untouched() {
        let mut mem = memory(8);
        assert_eq!(mem.as_mut_slice().write(4, &[1u8; 5]), Err(HostError::OutOfBounds));
        assert_eq!(mem, vec![0u8; 8]);
    }

    #[test]
    fn test_u32_little_endian() {
        let mut mem = memory(8);
        mem.as_mut_slice().write_u32(4, 0x0102_0304).unwrap();
        assert_eq!(&mem[4..], &[4, 3, 2, 1]);
        assert_eq!(mem.as_slice().read_u32(4).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_write_output_skip() {
        let mut mem = memory(16);
        mem.as_mut_slice()
            .write_output(SENTINEL, 0, b"ignored", true)
            .unwrap();
        assert_eq!(mem, vec![0u8; 16]);

        // Without allow_skip the sentinel is a regular (out of bounds) pointer.
        mem.as_mut_slice().write_u32(0, 16).unwrap();
        assert_eq!(
            mem.as_mut_slice().write_output(SENTINEL, 0, b"x", false),
            Err(HostError::OutOfBounds)
        );
    }

    #[test]
    fn test_write_output_exact_fit() {
        let mut mem = memory(32);
        mem.as_mut_slice().write_u32(0, 4).unwrap();
        mem.as_mut_slice().write_output(8, 0, b"abcd", false).unwrap();
        assert_eq!(&mem[8..12], b"abcd");
        assert_eq!(mem.as_slice().read_u32(0).unwrap(), 4);
    }

    proptest! {
        #[test]
        fn prop_write_output_contract(
            capacity in 0u32..64,
            data in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut mem = memory(128);
            mem.as_mut_slice().write_u32(0, capacity).unwrap();
            let before = mem.clone();

            let result = mem.as_mut_slice().write_output(16, 0, &data, true);

            if data.len() as u32 > capacity {
                prop_assert_eq!(result, Err(HostError::OutputBufferTooSmall));
                prop_assert_eq!(&mem, &before);
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(mem.as_slice().read_u32(0).unwrap(), data.len() as u32);
                prop_assert_eq!(&mem[16..16 + data.len()], &data[..]);
                prop_assert_eq!(&mem[16 + data.len()..], &before[16 + data.len()..]);
            }
        }

        #[test]
        fn prop_reads_never_exceed_memory(size in 0usize..256, ptr in any::<u32>(), len in any::<u32>()) {
            let mem = memory(size);
            let fits = (ptr as u64 + len as u64) <= size as u64;
            prop_assert_eq!(mem.as_slice().read(ptr, len).is_ok(), fits);
        }
    }
}
