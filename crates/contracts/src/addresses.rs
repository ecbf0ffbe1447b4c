use alloy_primitives::{address, Address};
use raffle_sync_core::Family;

/// Factory contracts the indexer listens to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FactoryAddresses {
    pub raffle: Address,
    pub giveaway: Address,
}

impl FactoryAddresses {
    /// Production deployment
    pub fn production() -> Self {
        Self {
            raffle: address!("2612fC96119Df2d88c5Be25dDd1276B06c7a763D"),
            giveaway: address!("e6C6Fd31394b6494210573511a5d76a4B228c7B5"),
        }
    }

    /// Contract family an emitting address belongs to
    pub fn family_of(&self, emitter: Address) -> Option<Family> {
        if emitter == self.raffle {
            Some(Family::Raffle)
        } else if emitter == self.giveaway {
            Some(Family::Giveaway)
        } else {
            None
        }
    }

    pub fn all(&self) -> [Address; 2] {
        [self.raffle, self.giveaway]
    }
}

impl Default for FactoryAddresses {
    fn default() -> Self {
        Self::production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_lookup() {
        let factories = FactoryAddresses::production();
        assert_eq!(factories.family_of(factories.raffle), Some(Family::Raffle));
        assert_eq!(factories.family_of(factories.giveaway), Some(Family::Giveaway));
        assert_eq!(factories.family_of(Address::ZERO), None);
    }
}
