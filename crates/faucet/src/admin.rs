//! Single-administrator pause switch.

use crate::error::{FaucetError, FaucetResult};
use spout_common::types::Address;

/// Holds the administrator identity and the pause flag.
///
/// The administrator is fixed at construction; there is no ownership transfer.
#[derive(Debug, Clone)]
pub struct AdminGate {
    admin: Address,
    paused: bool,
}

impl AdminGate {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            paused: false,
        }
    }

    pub fn with_paused(admin: Address, paused: bool) -> Self {
        Self { admin, paused }
    }

    pub fn set_paused(&mut self, caller: &Address, value: bool) -> FaucetResult<()> {
        if *caller != self.admin {
            return Err(FaucetError::Unauthorized);
        }
        self.paused = value;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ensure_not_paused(&self) -> FaucetResult<()> {
        if self.paused {
            Err(FaucetError::Paused)
        } else {
            Ok(())
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Address = Address::repeat_byte(0xaa);
    const OTHER: Address = Address::repeat_byte(0x01);

    #[test]
    fn test_admin_can_toggle() {
        let mut gate = AdminGate::new(ADMIN);
        assert!(!gate.is_paused());

        gate.set_paused(&ADMIN, true).unwrap();
        assert!(gate.is_paused());
        assert!(matches!(gate.ensure_not_paused(), Err(FaucetError::Paused)));

        gate.set_paused(&ADMIN, false).unwrap();
        assert!(gate.ensure_not_paused().is_ok());
    }

    #[test]
    fn test_non_admin_is_rejected_without_effect() {
        let mut gate = AdminGate::new(ADMIN);
        assert!(matches!(gate.set_paused(&OTHER, true), Err(FaucetError::Unauthorized)));
        assert!(!gate.is_paused());

        gate.set_paused(&ADMIN, true).unwrap();
        assert!(matches!(gate.set_paused(&OTHER, false), Err(FaucetError::Unauthorized)));
        assert!(gate.is_paused());
    }
}
