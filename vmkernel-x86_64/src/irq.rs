//! IRQ save/restore backing the cell and tree locks' IRQ discipline.

use vmkernel_hal::arch::IrqFlags;

/// Disable interrupts and return the prior `RFLAGS.IF` state, encoded as
/// `1` if interrupts were enabled, `0` otherwise. Matches the original
/// `SP_LockIRQ`/`PRDA` save-and-disable convention: acquiring an IRQ lock
/// saves the prior interrupt-enable state for the matching restore.
#[inline]
pub fn disable_save() -> IrqFlags {
    let was_enabled = x86_64::instructions::interrupts::are_enabled();
    x86_64::instructions::interrupts::disable();
    IrqFlags(was_enabled as usize)
}

/// Restore interrupts to the state encoded by a prior [`disable_save`].
///
/// # Safety
/// Must be paired with a `disable_save` on the same PCPU with no
/// intervening restore; violating this can re-enable interrupts inside a
/// nested lock's critical section.
#[inline]
pub unsafe fn restore(flags: IrqFlags) {
    if flags.0 != 0 {
        x86_64::instructions::interrupts::enable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip_is_a_plain_value() {
        let f = IrqFlags(1);
        assert_eq!(f.0, 1);
        let f0 = IrqFlags(0);
        assert_eq!(f0.0, 0);
    }
}
