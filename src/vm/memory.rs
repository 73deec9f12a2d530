//! Linear data memory.
//!
//! One contiguous byte region per invocation, shared by every far-call
//! frame. Layout: a small null guard at address 0, the heap region serviced
//! by the best-fit allocator, and the alloca stack growing down from the
//! top. Every access is bounds-checked against the full region; the
//! stack/heap split only constrains the two allocators, not loads and
//! stores.

use crate::vm::errors::Fault;
use crate::vm::heap::HeapAlloc;
use crate::vm::Limits;

/// Heap addresses start here so a successful allocation can never be 0.
const HEAP_BASE: u32 = 8;

/// The per-invocation linear memory.
pub struct Memory {
    bytes: Vec<u8>,
    heap: HeapAlloc,
    /// Alloca stack pointer; grows down towards `stack_limit`.
    stack_ptr: u32,
    /// Lowest address the alloca stack may reach.
    stack_limit: u32,
}

impl Memory {
    /// Creates a zero-filled memory with the default layout.
    pub fn new() -> Self {
        Self::with_sizes(Limits::LINEAR_MEMORY_SIZE, Limits::HEAP_SIZE)
    }

    /// Creates a memory of `total` bytes with a heap region of `heap_size`
    /// bytes after the null guard.
    pub fn with_sizes(total: u32, heap_size: u32) -> Self {
        assert!(HEAP_BASE + heap_size <= total);
        Self {
            bytes: vec![0; total as usize],
            heap: HeapAlloc::new(HEAP_BASE, heap_size),
            stack_ptr: total,
            stack_limit: HEAP_BASE + heap_size,
        }
    }

    /// Total size in bytes.
    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn check(&self, addr: u32, len: u32) -> Result<(), Fault> {
        let end = addr.checked_add(len).ok_or(Fault::MemoryBounds { addr, len })?;
        if end as usize > self.bytes.len() {
            return Err(Fault::MemoryBounds { addr, len });
        }
        Ok(())
    }

    /// Read-only view of `[addr, addr + len)`.
    pub fn read(&self, addr: u32, len: u32) -> Result<&[u8], Fault> {
        self.check(addr, len)?;
        Ok(&self.bytes[addr as usize..(addr + len) as usize])
    }

    /// Mutable view of `[addr, addr + len)`.
    pub fn read_mut(&mut self, addr: u32, len: u32) -> Result<&mut [u8], Fault> {
        self.check(addr, len)?;
        Ok(&mut self.bytes[addr as usize..(addr + len) as usize])
    }

    /// Copies a byte slice into memory at `addr`.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Fault> {
        let dst = self.read_mut(addr, data.len() as u32)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Fixed-size read.
    pub fn read_array<const N: usize>(&self, addr: u32) -> Result<[u8; N], Fault> {
        let slice = self.read(addr, N as u32)?;
        Ok(slice.try_into().expect("length checked"))
    }

    pub fn load_u8(&self, addr: u32) -> Result<u8, Fault> {
        Ok(self.read(addr, 1)?[0])
    }

    pub fn store_u8(&mut self, addr: u32, value: u8) -> Result<(), Fault> {
        self.read_mut(addr, 1)?[0] = value;
        Ok(())
    }

    /// Length of the zero-terminated string at `addr`.
    pub fn strlen(&self, addr: u32) -> Result<u32, Fault> {
        let tail = self.read(addr, self.size() - addr.min(self.size()))?;
        tail.iter()
            .position(|&b| b == 0)
            .map(|n| n as u32)
            .ok_or(Fault::MemoryBounds {
                addr,
                len: tail.len() as u32,
            })
    }

    /// The zero-terminated string at `addr`, without the terminator.
    pub fn read_str(&self, addr: u32) -> Result<&[u8], Fault> {
        let len = self.strlen(addr)?;
        self.read(addr, len)
    }

    /// Reserves `size` bytes on the alloca stack and returns their address.
    pub fn stack_alloc(&mut self, size: u32) -> Result<u32, Fault> {
        let ptr = self
            .stack_ptr
            .checked_sub(size)
            .ok_or(Fault::MemoryStackBounds)?;
        if ptr < self.stack_limit {
            return Err(Fault::MemoryStackBounds);
        }
        self.stack_ptr = ptr;
        Ok(ptr)
    }

    /// Releases `size` bytes from the alloca stack.
    pub fn stack_free(&mut self, size: u32) -> Result<(), Fault> {
        let ptr = self
            .stack_ptr
            .checked_add(size)
            .ok_or(Fault::MemoryStackBounds)?;
        if ptr > self.size() {
            return Err(Fault::MemoryStackBounds);
        }
        self.stack_ptr = ptr;
        Ok(())
    }

    /// Allocates from the heap region. Returns 0 on exhaustion, which the
    /// contract observes as a null pointer.
    pub fn heap_alloc(&mut self, size: u32) -> u32 {
        self.heap.alloc(size)
    }

    /// Frees a heap allocation.
    pub fn heap_free(&mut self, addr: u32) -> Result<(), Fault> {
        self.heap.free(addr)
    }

    /// Largest allocation the heap could currently serve.
    pub fn heap_largest_free(&self) -> u32 {
        self.heap.largest_free()
    }

    /// Size of the live heap allocation at `addr`, if any.
    pub fn heap_allocation_size(&self, addr: u32) -> Option<u32> {
        self.heap.allocation_size(addr)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_roundtrip() {
        let mut m = Memory::new();
        m.write(100, b"hello").unwrap();
        assert_eq!(m.read(100, 5).unwrap(), b"hello");
    }

    #[test]
    fn out_of_bounds_read_faults() {
        let m = Memory::new();
        let size = m.size();
        assert!(m.read(size, 1).is_err());
        assert!(m.read(size - 1, 2).is_err());
        assert!(m.read(size - 1, 1).is_ok());
    }

    #[test]
    fn address_overflow_faults() {
        let m = Memory::new();
        assert!(matches!(
            m.read(u32::MAX, 2),
            Err(Fault::MemoryBounds { .. })
        ));
    }

    #[test]
    fn stack_alloc_grows_down() {
        let mut m = Memory::new();
        let a = m.stack_alloc(16).unwrap();
        let b = m.stack_alloc(16).unwrap();
        assert_eq!(a, m.size() - 16);
        assert_eq!(b, a - 16);
    }

    #[test]
    fn stack_alloc_respects_heap_boundary() {
        let mut m = Memory::with_sizes(0x1000, 0x800);
        // The alloca region is [0x808, 0x1000): 0x7F8 bytes.
        assert!(m.stack_alloc(0x7F8).is_ok());
        assert_eq!(m.stack_alloc(1), Err(Fault::MemoryStackBounds));
    }

    #[test]
    fn stack_free_cannot_pass_base() {
        let mut m = Memory::new();
        m.stack_alloc(8).unwrap();
        assert!(m.stack_free(8).is_ok());
        assert_eq!(m.stack_free(1), Err(Fault::MemoryStackBounds));
    }

    #[test]
    fn heap_alloc_stays_inside_heap_region() {
        let mut m = Memory::with_sizes(0x1000, 0x100);
        let p = m.heap_alloc(0x100);
        assert_eq!(p, 8);
        assert_eq!(m.heap_alloc(1), 0);
    }

    #[test]
    fn strlen_finds_terminator() {
        let mut m = Memory::new();
        m.write(50, b"abc\0").unwrap();
        assert_eq!(m.strlen(50).unwrap(), 3);
        assert_eq!(m.read_str(50).unwrap(), b"abc");
    }

    #[test]
    fn memory_is_zero_initialized() {
        let m = Memory::new();
        assert!(m.read(0, 64).unwrap().iter().all(|&b| b == 0));
    }
}
