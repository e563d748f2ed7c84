use cohort_core::{
    Address, Asset, BlockContext, Capability, InMemoryTokens, Permission, PermissionTable, Scope,
    RATIO_BASE,
};
use governance::*;
use primitive_types::U256;

const ADMIN: Address = Address([0xAD; 20]);
const START: u64 = 1_700_000_000;

type Engine = GovernanceEngine<InMemoryTokens, InMemoryHost>;

fn member(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn admin_cap(scope: Scope, permission: Permission) -> Capability {
    let table = PermissionTable::with_admins([ADMIN]);
    Capability::issue(&table, ADMIN, scope, permission).unwrap()
}

fn at(block: u64, offset: u64) -> BlockContext {
    BlockContext::new(block, START + offset)
}

fn new_engine() -> Engine {
    GovernanceEngine::new(InMemoryTokens::new(), InMemoryHost::new(), EngineOptions::default())
}

/// Five listed members, 50% support, 20% participation
fn five_member_group(engine: &mut Engine, mode: VotingMode) -> u64 {
    let settings = VotingSettings {
        voting_mode: mode,
        support_threshold: RATIO_BASE / 2,
        min_participation: RATIO_BASE / 5,
        ..Default::default()
    };
    engine
        .create_group(
            &admin_cap(Scope::Organization, Permission::CreateGroup),
            &at(1, 0),
            "council",
            MembershipConfig::AddressList {
                members: (1..=5).map(member).collect(),
            },
            settings,
            None,
        )
        .unwrap()
}

fn fund_vault(engine: &mut Engine, group_id: u64, amount: u128, ctx: &BlockContext) {
    let donor = member(900);
    engine.host_mut().fund(donor, Asset::Native, amount);
    engine
        .deposit(ctx, group_id, donor, Asset::Native, amount)
        .unwrap();
}

fn propose(engine: &mut Engine, group_id: u64, actions: Vec<Action>, allow: U256) -> u64 {
    engine
        .create_proposal(
            &at(2, 10),
            member(1),
            ProposalRequest {
                group_id,
                metadata: "ipfs://proposal".to_string(),
                actions,
                allow_failure_map: allow,
                ..Default::default()
            },
        )
        .unwrap()
}

#[test]
fn test_three_of_five_executes_early() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::EarlyExecution);
    fund_vault(&mut engine, group, 1_000, &at(1, 5));

    let payee = member(42);
    let id = propose(&mut engine, group, vec![Action::transfer(payee, 300)], U256::zero());

    engine.vote(&at(3, 20), member(1), id, VoteOption::Yes, true).unwrap();
    engine.vote(&at(3, 21), member(2), id, VoteOption::Yes, true).unwrap();
    assert!(!engine.can_execute(id, START + 21).unwrap());

    // Third yes: 3 / (3 + 2) > 0.5 even if the rest vote no
    engine.vote(&at(4, 30), member(3), id, VoteOption::Yes, true).unwrap();

    let view = engine.get_proposal(id, START + 30).unwrap();
    assert!(view.executed);
    assert!(START + 30 < view.parameters.end_date);
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 700);
    assert_eq!(engine.host().balance(&payee, &Asset::Native), 300);

    let kinds: Vec<_> = engine.take_events().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds.last(), Some(&"ProposalExecuted"));
}

#[test]
fn test_tie_at_end_is_not_executable() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    let id = propose(&mut engine, group, vec![], U256::zero());

    engine.vote(&at(3, 20), member(1), id, VoteOption::Yes, false).unwrap();
    engine.vote(&at(3, 21), member(2), id, VoteOption::No, false).unwrap();

    let end = engine.get_proposal(id, START).unwrap().parameters.end_date;
    let after = BlockContext::new(10, end);
    assert!(!engine.can_execute(id, end).unwrap());
    assert_eq!(
        engine.execute(&after, id).unwrap_err(),
        GovernanceError::ProposalExecutionForbidden { proposal_id: id }
    );
}

#[test]
fn test_double_execute_has_single_effect() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    fund_vault(&mut engine, group, 500, &at(1, 5));
    let id = propose(&mut engine, group, vec![Action::transfer(member(42), 200)], U256::zero());

    for voter in 1..=3 {
        engine.vote(&at(3, 20), member(voter), id, VoteOption::Yes, false).unwrap();
    }
    let end = engine.get_proposal(id, START).unwrap().parameters.end_date;
    let after = BlockContext::new(10, end);

    engine.execute(&after, id).unwrap();
    assert!(matches!(
        engine.execute(&after, id),
        Err(GovernanceError::ProposalExecutionForbidden { .. })
    ));
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 300);
    assert_eq!(engine.host().balance(&member(42), &Asset::Native), 200);
}

#[test]
fn test_overdraw_leaves_balance_unchanged() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    fund_vault(&mut engine, group, 100, &at(1, 5));

    let cap = admin_cap(Scope::Group(group), Permission::Withdraw);
    let err = engine
        .withdraw(&cap, &at(2, 10), group, Asset::Native, 101, member(7))
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Vault(_)));
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 100);
    assert_eq!(engine.host().balance(&member(7), &Asset::Native), 0);

    engine
        .withdraw(&cap, &at(2, 11), group, Asset::Native, 100, member(7))
        .unwrap();
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 0);
    assert_eq!(engine.host().balance(&member(7), &Asset::Native), 100);
}

#[test]
fn test_withdraw_needs_group_capability() {
    let mut engine = new_engine();
    let a = five_member_group(&mut engine, VotingMode::Standard);
    let b = five_member_group(&mut engine, VotingMode::Standard);
    fund_vault(&mut engine, b, 50, &at(1, 5));

    let holder = member(77);
    let mut table = PermissionTable::new();
    table.grant(holder, Scope::Group(a), Permission::Withdraw);
    let cap = Capability::issue(&table, holder, Scope::Group(a), Permission::Withdraw).unwrap();

    let err = engine
        .withdraw(&cap, &at(2, 10), b, Asset::Native, 10, holder)
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));
    assert_eq!(engine.vault_balance(b, &Asset::Native).unwrap(), 50);
}

#[test]
fn test_token_total_supply_is_historical() {
    let mut engine = new_engine();
    let token = member(1_000);
    {
        let tokens = engine.tokens_mut();
        tokens.register(token).unwrap();
        tokens.mint(&token, &member(1), 600, 1).unwrap();
        tokens.mint(&token, &member(2), 400, 1).unwrap();
    }
    let group = engine
        .create_group(
            &admin_cap(Scope::Organization, Permission::CreateGroup),
            &at(1, 0),
            "holders",
            MembershipConfig::TokenBalance { token },
            VotingSettings::default(),
            None,
        )
        .unwrap();

    let id = propose(&mut engine, group, vec![], U256::zero());
    {
        let tokens = engine.tokens_mut();
        tokens.mint(&token, &member(3), 5_000, 5).unwrap();
        tokens.burn(&token, &member(1), 600, 6).unwrap();
    }

    assert_eq!(engine.total_voting_power(group, 1).unwrap(), 1_000);
    assert_eq!(engine.total_voting_power(group, 5).unwrap(), 6_000);
    assert_eq!(engine.total_voting_power(group, 6).unwrap(), 5_400);
    assert_eq!(engine.get_proposal(id, START).unwrap().total_voting_power, 1_000);

    // Late holders have no power on the proposal; burned balance still counts
    assert!(!engine.can_vote(id, &member(3), VoteOption::Yes, START + 20).unwrap());
    engine.vote(&at(7, 20), member(1), id, VoteOption::Yes, false).unwrap();
    assert_eq!(engine.get_proposal(id, START + 20).unwrap().tally.yes, 600);
}

#[test]
fn test_vote_replacement_moves_power() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::VoteReplacement);
    let id = propose(&mut engine, group, vec![], U256::zero());

    engine.vote(&at(3, 20), member(1), id, VoteOption::Yes, false).unwrap();
    engine.vote(&at(3, 21), member(2), id, VoteOption::Yes, false).unwrap();
    let before = engine.get_proposal(id, START + 21).unwrap().tally;

    let cast = engine.vote(&at(3, 22), member(1), id, VoteOption::No, false).unwrap();
    assert_eq!(cast.replaced, Some(VoteOption::Yes));

    let after = engine.get_proposal(id, START + 22).unwrap().tally;
    assert_eq!(after.yes, before.yes - 1);
    assert_eq!(after.no, before.no + 1);
    assert_eq!(after.total(), before.total());
    assert_eq!(engine.get_vote(id, &member(1)).unwrap(), Some(VoteOption::No));
}

#[test]
fn test_vote_replacement_accepts_same_option() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::VoteReplacement);
    let id = propose(&mut engine, group, vec![], U256::zero());

    engine.vote(&at(3, 20), member(2), id, VoteOption::Yes, false).unwrap();
    let before = engine.get_proposal(id, START + 20).unwrap().tally;
    engine.take_events();

    assert!(engine.can_vote(id, &member(2), VoteOption::Yes, START + 21).unwrap());
    let cast = engine.vote(&at(3, 21), member(2), id, VoteOption::Yes, false).unwrap();
    assert_eq!(cast.replaced, Some(VoteOption::Yes));
    assert_eq!(engine.get_proposal(id, START + 21).unwrap().tally, before);

    let events = engine.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Event::VoteCast { option: VoteOption::Yes, voting_power: 1, .. }
    ));
}

#[test]
fn test_membership_history_is_stable() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    let cap = admin_cap(Scope::Group(group), Permission::ManageMembership);

    engine.add_addresses(&cap, &at(5, 100), group, &[member(6)]).unwrap();
    engine.remove_addresses(&cap, &at(8, 200), group, &[member(1)]).unwrap();

    for block in 0..5 {
        assert!(!engine.is_listed_at_block(group, &member(6), block).unwrap());
    }
    for block in 1..8 {
        assert!(engine.is_listed_at_block(group, &member(1), block).unwrap());
    }
    assert!(!engine.is_listed_at_block(group, &member(1), 8).unwrap());
    assert_eq!(engine.total_voting_power(group, 4).unwrap(), 5);
    assert_eq!(engine.total_voting_power(group, 5).unwrap(), 6);
    assert_eq!(engine.total_voting_power(group, 8).unwrap(), 5);

    let err = engine
        .add_addresses(&cap, &at(9, 300), group, &[member(2)])
        .unwrap_err();
    assert_eq!(err, GovernanceError::AlreadyListed { account: member(2) });
}

#[test]
fn test_failing_action_reverts_everything() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    fund_vault(&mut engine, group, 1_000, &at(1, 5));

    let broken = member(66);
    engine.host_mut().fail_calls_to(broken);
    let id = propose(
        &mut engine,
        group,
        vec![Action::transfer(member(42), 100), Action::transfer(broken, 50)],
        U256::zero(),
    );
    for voter in 1..=3 {
        engine.vote(&at(3, 20), member(voter), id, VoteOption::Yes, false).unwrap();
    }
    engine.take_events();

    let end = engine.get_proposal(id, START).unwrap().parameters.end_date;
    let err = engine.execute(&BlockContext::new(10, end), id).unwrap_err();
    assert!(matches!(err, GovernanceError::ActionFailed { index: 1, .. }));

    assert!(!engine.proposal(id).unwrap().executed);
    assert!(engine.can_execute(id, end).unwrap());
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 1_000);
    assert_eq!(engine.host().balance(&member(42), &Asset::Native), 0);
    assert!(engine.host().calls().is_empty());
    assert!(engine.take_events().is_empty());
}

#[test]
fn test_allowed_failure_is_skipped() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    fund_vault(&mut engine, group, 1_000, &at(1, 5));

    let broken = member(66);
    engine.host_mut().fail_calls_to(broken);
    let id = propose(
        &mut engine,
        group,
        vec![Action::transfer(broken, 50), Action::transfer(member(42), 100)],
        U256::one(),
    );
    for voter in 1..=3 {
        engine.vote(&at(3, 20), member(voter), id, VoteOption::Yes, false).unwrap();
    }

    let end = engine.get_proposal(id, START).unwrap().parameters.end_date;
    let outcome = engine.execute(&BlockContext::new(10, end), id).unwrap();
    assert_eq!(outcome.failure_map, U256::one());

    let proposal = engine.proposal(id).unwrap();
    assert!(proposal.executed);
    assert_eq!(proposal.execution_failure_map, U256::one());
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 900);
    assert_eq!(engine.host().balance(&member(42), &Asset::Native), 100);
}

#[test]
fn test_failed_initial_deposit_creates_nothing() {
    let mut engine = new_engine();
    let err = engine
        .create_group(
            &admin_cap(Scope::Organization, Permission::CreateGroup),
            &at(1, 0),
            "broke",
            MembershipConfig::AddressList {
                members: vec![member(1)],
            },
            VotingSettings::default(),
            Some(InitialDeposit {
                from: member(1),
                asset: Asset::Native,
                amount: 10,
            }),
        )
        .unwrap_err();

    assert!(matches!(err, GovernanceError::InitialDepositFailed(_)));
    assert_eq!(engine.group_count(), 0);
    assert!(engine.take_events().is_empty());

    engine.host_mut().fund(member(1), Asset::Native, 10);
    let group = engine
        .create_group(
            &admin_cap(Scope::Organization, Permission::CreateGroup),
            &at(1, 0),
            "funded",
            MembershipConfig::AddressList {
                members: vec![member(1)],
            },
            VotingSettings::default(),
            Some(InitialDeposit {
                from: member(1),
                asset: Asset::Native,
                amount: 10,
            }),
        )
        .unwrap();
    assert_eq!(group, 0);
    assert_eq!(engine.vault_balance(group, &Asset::Native).unwrap(), 10);
}

#[test]
fn test_settings_update_keeps_existing_proposals() {
    let mut engine = new_engine();
    let group = five_member_group(&mut engine, VotingMode::Standard);
    let id = propose(&mut engine, group, vec![], U256::zero());

    let stricter = VotingSettings {
        support_threshold: 900_000,
        ..Default::default()
    };
    engine
        .update_voting_settings(
            &admin_cap(Scope::Group(group), Permission::UpdateVotingSettings),
            &at(3, 15),
            group,
            stricter.clone(),
        )
        .unwrap();

    assert_eq!(engine.group(group).unwrap().settings, stricter);
    assert_eq!(
        engine.get_proposal(id, START).unwrap().parameters.support_threshold,
        RATIO_BASE / 2
    );

    let bad = VotingSettings {
        min_participation: RATIO_BASE + 1,
        ..Default::default()
    };
    assert!(matches!(
        engine.update_voting_settings(
            &admin_cap(Scope::Group(group), Permission::UpdateVotingSettings),
            &at(3, 16),
            group,
            bad,
        ),
        Err(GovernanceError::RatioOutOfBounds { .. })
    ));
}
