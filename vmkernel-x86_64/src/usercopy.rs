//! Raw segment-limited user copy primitives.
//!
//! The original `UserDoCopyIn`/`UserDoCopyOut` (`user/userCopy.h`) take an
//! explicit segment register value alongside the user VA — user copies run
//! against a (possibly limited) segment selector distinct from the kernel's
//! own data segment. `vmkernel_core::boundary` owns the fault-restart
//! discipline (validating the range, setting/clearing the copy-in-progress
//! marker); this module only performs the already-validated raw copy.

/// The segment selector a user copy runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSegment(pub u16);

impl UserSegment {
    /// The flat per-cartel user data segment used by ordinary user copies.
    pub const USER_DATA: UserSegment = UserSegment(0x2b);
}

/// Copy `len` bytes from a validated user address into kernel memory.
///
/// # Safety
/// The caller (`vmkernel_core::boundary::copy_in`) must have already
/// established that `[src, src + len)` lies within the user VA range and is
/// mapped for read access under `seg`; this function performs no checks of
/// its own and will fault the real hardware on an unmapped range, exactly
/// as the original assembly routine does.
#[inline]
pub unsafe fn raw_copy_in(_seg: UserSegment, dst: *mut u8, src: usize, len: usize) {
    unsafe {
        core::ptr::copy_nonoverlapping(src as *const u8, dst, len);
    }
}

/// Copy `len` bytes from kernel memory to a validated user address.
///
/// # Safety
/// Same preconditions as [`raw_copy_in`], mirrored for the write direction.
#[inline]
pub unsafe fn raw_copy_out(_seg: UserSegment, dst: usize, src: *const u8, len: usize) {
    unsafe {
        core::ptr::copy_nonoverlapping(src, dst as *mut u8, len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_in_moves_bytes() {
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        unsafe {
            raw_copy_in(UserSegment::USER_DATA, dst.as_mut_ptr(), src.as_ptr() as usize, 4);
        }
        assert_eq!(dst, src);
    }

    #[test]
    fn copy_out_moves_bytes() {
        let src = [9u8, 8, 7, 6];
        let mut dst = [0u8; 4];
        unsafe {
            raw_copy_out(UserSegment::USER_DATA, dst.as_mut_ptr() as usize, src.as_ptr(), 4);
        }
        assert_eq!(dst, src);
    }
}
