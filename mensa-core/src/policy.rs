use serde::Deserialize;

/// Who may confirm a pending claim. Injected into the lifecycle manager at
/// startup; the default matches the community's flow where the seller
/// confirms that payment arrived.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmPolicy {
    #[default]
    Seller,
    Buyer,
    Either,
}

impl ConfirmPolicy {
    pub fn allows(&self, actor: &str, buyer: &str, seller: &str) -> bool {
        match self {
            ConfirmPolicy::Seller => actor == seller,
            ConfirmPolicy::Buyer => actor == buyer,
            ConfirmPolicy::Either => actor == buyer || actor == seller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_gates_the_confirming_actor() {
        assert!(ConfirmPolicy::Seller.allows("s", "b", "s"));
        assert!(!ConfirmPolicy::Seller.allows("b", "b", "s"));
        assert!(ConfirmPolicy::Buyer.allows("b", "b", "s"));
        assert!(!ConfirmPolicy::Buyer.allows("s", "b", "s"));
        assert!(ConfirmPolicy::Either.allows("b", "b", "s"));
        assert!(ConfirmPolicy::Either.allows("s", "b", "s"));
        assert!(!ConfirmPolicy::Either.allows("x", "b", "s"));
    }
}
