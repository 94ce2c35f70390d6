//! C6 UserBoundary: fault-restart copy in/out, exception dispatch,
//! cartel shutdown. Grounded on
//! `examples/original_source/user/userCopy.h` (`UserDoCopyIn/Out`,
//! `Reg32 seg`) and spec.md §4.6, §9 ("simulate [longjmp] with a
//! function-level `Result<T, CopyFault>`").

extern crate alloc;

use crate::error::SchedError;

/// The segment selector a user copy runs against (spec §C.7, `Reg32
/// seg` in the original `UserDoCopyIn/Out`). Kept as a plain `u16` here
/// since this module is architecture-neutral; the concrete x86 encoding
/// lives in `vmkernel-x86_64::usercopy::UserSegment`.
pub const USER_DATA_SEGMENT: u16 = 0x2b;

/// Why a user copy failed (spec §4.6 "the translated error
/// (`InvalidAddress`, `NoAccess`)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFault {
    InvalidAddress,
    NoAccess,
}

impl From<CopyFault> for SchedError {
    fn from(f: CopyFault) -> SchedError {
        match f {
            CopyFault::InvalidAddress => SchedError::InvalidAddress,
            CopyFault::NoAccess => SchedError::NoAccess,
        }
    }
}

/// The per-world "scoped fault handler" slot (spec §9: "the per-world
/// slot is the natural home for the one active handler"). In a
/// memory-safe reimplementation this carries no actual jump target; it
/// only records that a copy is in progress so re-entrancy can be
/// detected, matching spec §4.6 "Re-entrant copies are forbidden".
pub struct CopyBoundary {
    in_progress: bool,
    last_status: Option<CopyFault>,
}

impl CopyBoundary {
    pub const fn new() -> CopyBoundary {
        CopyBoundary {
            in_progress: false,
            last_status: None,
        }
    }

    fn enter(&mut self) -> Result<(), SchedError> {
        if self.in_progress {
            return Err(SchedError::BadParam);
        }
        self.in_progress = true;
        self.last_status = None;
        Ok(())
    }

    fn exit(&mut self) {
        self.in_progress = false;
    }

    /// A range validator stands in for the real page-table walk: given a
    /// user VA and length, decide whether the copy would fault. Real
    /// deployments wire this to the (out-of-scope) memory subsystem's
    /// `va_to_mpn`; tests supply a closure directly.
    fn validate(
        validator: impl Fn(usize, usize) -> Option<CopyFault>,
        addr: usize,
        len: usize,
    ) -> Result<(), CopyFault> {
        match validator(addr, len) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// `copy_in(dst_kern, src_user, len)` (spec §4.6 "Copy discipline").
    pub fn copy_in(
        &mut self,
        seg: u16,
        dst: &mut [u8],
        src_user: usize,
        validator: impl Fn(usize, usize) -> Option<CopyFault>,
    ) -> Result<(), SchedError> {
        self.enter()?;
        let result = Self::validate(validator, src_user, dst.len()).map_err(|fault| {
            self.last_status = Some(fault);
            SchedError::from(fault)
        });
        if result.is_ok() {
            unsafe {
                vmkernel_hal::arch::current().raw_copy_in(seg, dst.as_mut_ptr(), src_user, dst.len());
            }
        }
        self.exit();
        result
    }

    /// `copy_out(dst_user, src_kern, len)` (spec §4.6).
    pub fn copy_out(
        &mut self,
        seg: u16,
        dst_user: usize,
        src: &[u8],
        validator: impl Fn(usize, usize) -> Option<CopyFault>,
    ) -> Result<(), SchedError> {
        self.enter()?;
        let result = Self::validate(validator, dst_user, src.len()).map_err(|fault| {
            self.last_status = Some(fault);
            SchedError::from(fault)
        });
        if result.is_ok() {
            unsafe {
                vmkernel_hal::arch::current().raw_copy_out(seg, dst_user, src.as_ptr(), src.len());
            }
        }
        self.exit();
        result
    }

    /// `copy_in_string(dst, src, max)`: bounds at `max` bytes including
    /// the terminator (spec §4.6 "returns `LimitExceeded` if
    /// unterminated").
    pub fn copy_in_string(
        &mut self,
        seg: u16,
        dst: &mut [u8],
        src_user: usize,
        max: usize,
        validator: impl Fn(usize, usize) -> Option<CopyFault>,
    ) -> Result<usize, SchedError> {
        let len = max.min(dst.len());
        self.copy_in(seg, &mut dst[..len], src_user, validator)?;
        match dst[..len].iter().position(|&b| b == 0) {
            Some(nul) => Ok(nul),
            None => Err(SchedError::LimitExceeded),
        }
    }
}

impl Default for CopyBoundary {
    fn default() -> CopyBoundary {
        CopyBoundary::new()
    }
}

/// A hardware exception vector, abstracted from the real x86 vector
/// table (spec §4.6 "Exception dispatch").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionVector {
    PageFault,
    DeviceNotAvailable,
    Other(u8),
}

/// The outcome of dispatching one exception, in priority order (spec
/// §4.6 steps 1-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    ResumedByDemandMapping,
    ResumedByCopyFaultRedirect(CopyFault),
    ResumedAsSpuriousDeviceFault,
    ResumedIntoUserSignalHandler,
    TrappedIntoDebugger,
    CartelShutdown { exit_code: i32 },
}

/// Inputs the dispatcher needs from collaborators it does not own (the
/// memory fault handler, the signal subsystem, the debugger transport).
/// Only the contract is modeled; behavior is the caller's.
pub struct DispatchContext<'a> {
    pub vector: ExceptionVector,
    pub in_user_va_range: bool,
    pub demand_map: &'a dyn Fn() -> bool,
    pub copy_in_progress: bool,
    pub copy_fault: Option<CopyFault>,
    pub ts_save_restore_active: bool,
    pub user_signal_registered: bool,
    pub debugger_attached: bool,
    pub syserr_base: i32,
    pub translated_signal: i32,
}

/// Dispatch one exception from user mode (spec §4.6 "Exception
/// dispatch", steps 1-6, applied in order).
pub fn dispatch_exception(ctx: &DispatchContext) -> DispatchOutcome {
    if ctx.vector == ExceptionVector::PageFault && ctx.in_user_va_range && (ctx.demand_map)() {
        return DispatchOutcome::ResumedByDemandMapping;
    }
    if ctx.copy_in_progress {
        if let Some(fault) = ctx.copy_fault {
            return DispatchOutcome::ResumedByCopyFaultRedirect(fault);
        }
    }
    if ctx.vector == ExceptionVector::DeviceNotAvailable && ctx.ts_save_restore_active {
        return DispatchOutcome::ResumedAsSpuriousDeviceFault;
    }
    if ctx.user_signal_registered {
        return DispatchOutcome::ResumedIntoUserSignalHandler;
    }
    if ctx.debugger_attached {
        return DispatchOutcome::TrappedIntoDebugger;
    }
    DispatchOutcome::CartelShutdown {
        exit_code: ctx.syserr_base + ctx.translated_signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ensure_registered as ensure_arch_registered;

    #[test]
    fn copy_in_fault_returns_invalid_address_and_clears_in_progress() {
        ensure_arch_registered();
        let mut boundary = CopyBoundary::new();
        let mut dst = [0u8; 32];
        let result = boundary.copy_in(USER_DATA_SEGMENT, &mut dst, 0xDEAD_BEEF, |_, _| {
            Some(CopyFault::InvalidAddress)
        });
        assert_eq!(result.unwrap_err(), SchedError::InvalidAddress);
        assert!(!boundary.in_progress);
    }

    #[test]
    fn copy_in_success_moves_bytes_and_clears_status() {
        ensure_arch_registered();
        let mut boundary = CopyBoundary::new();
        let src = [7u8; 16];
        let mut dst = [0u8; 16];
        let result = boundary.copy_in(USER_DATA_SEGMENT, &mut dst, src.as_ptr() as usize, |_, _| None);
        assert!(result.is_ok());
        assert_eq!(dst, src);
        assert!(boundary.last_status.is_none());
    }

    #[test]
    fn re_entrant_copy_is_forbidden() {
        ensure_arch_registered();
        let mut boundary = CopyBoundary::new();
        boundary.in_progress = true;
        let mut dst = [0u8; 4];
        let result = boundary.copy_in(USER_DATA_SEGMENT, &mut dst, 0, |_, _| None);
        assert_eq!(result.unwrap_err(), SchedError::BadParam);
    }

    #[test]
    fn copy_in_string_requires_a_terminator_within_max() {
        ensure_arch_registered();
        let mut boundary = CopyBoundary::new();
        let src = alloc::vec![b'h', b'i', 0u8, 9u8];
        let mut dst = [0u8; 4];
        let len = boundary
            .copy_in_string(USER_DATA_SEGMENT, &mut dst, src.as_ptr() as usize, 4, |_, _| None)
            .unwrap();
        assert_eq!(len, 2);

        let mut boundary2 = CopyBoundary::new();
        let unterminated = alloc::vec![1u8, 2, 3, 4];
        let mut dst2 = [0u8; 4];
        let err = boundary2
            .copy_in_string(USER_DATA_SEGMENT, &mut dst2, unterminated.as_ptr() as usize, 4, |_, _| None)
            .unwrap_err();
        assert_eq!(err, SchedError::LimitExceeded);
    }

    #[test]
    fn page_fault_in_user_range_resumes_via_demand_mapping() {
        let ctx = DispatchContext {
            vector: ExceptionVector::PageFault,
            in_user_va_range: true,
            demand_map: &|| true,
            copy_in_progress: false,
            copy_fault: None,
            ts_save_restore_active: false,
            user_signal_registered: false,
            debugger_attached: false,
            syserr_base: 1000,
            translated_signal: 11,
        };
        assert_eq!(dispatch_exception(&ctx), DispatchOutcome::ResumedByDemandMapping);
    }

    #[test]
    fn dispatch_falls_through_to_cartel_shutdown_with_encoded_exit_code() {
        let ctx = DispatchContext {
            vector: ExceptionVector::Other(13),
            in_user_va_range: false,
            demand_map: &|| false,
            copy_in_progress: false,
            copy_fault: None,
            ts_save_restore_active: false,
            user_signal_registered: false,
            debugger_attached: false,
            syserr_base: 1000,
            translated_signal: 11,
        };
        assert_eq!(
            dispatch_exception(&ctx),
            DispatchOutcome::CartelShutdown { exit_code: 1011 }
        );
    }
}
