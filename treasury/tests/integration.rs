use cohort_core::{Address, Asset, Capability, Permission, PermissionTable, Scope};
use proptest::prelude::*;
use treasury::*;

fn treasurer(group_id: u64) -> Capability {
    let holder = Address::from_low_u64(77);
    let mut table = PermissionTable::new();
    table.grant(holder, Scope::Group(group_id), Permission::Withdraw);
    Capability::issue(&table, holder, Scope::Group(group_id), Permission::Withdraw).unwrap()
}

#[test]
fn test_vault_basic_flow() {
    let mut vault = GroupVault::new(3);
    let donor = Address::from_low_u64(1);
    let token = Asset::Token(Address::from_low_u64(500));

    vault.deposit(Asset::Native, 5_000, donor, 10).unwrap();
    vault.deposit(token, 250, donor, 11).unwrap();

    vault
        .withdraw(&treasurer(3), token, 250, Address::from_low_u64(2), 12)
        .unwrap();

    assert_eq!(vault.balance(&Asset::Native), 5_000);
    assert_eq!(vault.balance(&token), 0);

    let kinds: Vec<_> = vault.entries().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(
        kinds.last(),
        Some(&VaultEntryKind::Withdrawal {
            recipient: Address::from_low_u64(2),
            authorized_by: Address::from_low_u64(77),
        })
    );
}

proptest! {
    // Whatever sequence of withdrawals is attempted, the balance tracks
    // exactly the successful ones and never underflows.
    #[test]
    fn prop_balance_never_negative(
        initial in 0u128..10_000,
        requests in prop::collection::vec(1u128..3_000, 0..30),
    ) {
        let mut vault = GroupVault::new(0);
        if initial > 0 {
            vault.deposit(Asset::Native, initial, Address::from_low_u64(1), 0).unwrap();
        }
        let cap = treasurer(0);
        let mut expected = initial;

        for amount in requests {
            let before = vault.balance(&Asset::Native);
            match vault.withdraw(&cap, Asset::Native, amount, Address::from_low_u64(2), 1) {
                Ok(()) => expected -= amount,
                Err(VaultError::InsufficientBalance { available, .. }) => {
                    prop_assert_eq!(available, before);
                    prop_assert!(amount > before);
                }
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
            prop_assert_eq!(vault.balance(&Asset::Native), expected);
        }
    }
}
