use super::common::*;
use std::sync::Arc;

use crate::marketplace::claims::ClaimError;
use crate::marketplace::domain::{
    ClaimId, DirectLeadStatus, LeadStatus, ProfessionalId,
};
use crate::marketplace::ledger::{LedgerError, TransactionType};
use crate::marketplace::memory::{InMemoryMarketplaceStore, RecordingNotifier};
use crate::marketplace::repository::{MarketplaceEvent, RepositoryError};
use crate::marketplace::service::Marketplace;

#[test]
fn claims_fill_slots_until_lead_is_full() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let a = professional("a");
    let b = professional("b");
    let c = professional("c");
    let d = professional("d");
    fund(&marketplace, &a.id, 10);
    fund(&marketplace, &b.id, 3);
    fund(&marketplace, &c.id, 5);
    fund(&marketplace, &d.id, 50);

    let receipt = marketplace.claim_lead(&lead.id, &a).expect("A claims");
    assert_eq!(receipt.remaining_credits, 5);
    assert_eq!(receipt.claim.credits_spent, 5);
    let after_a = marketplace.lead(&lead.id).expect("lead");
    assert_eq!(after_a.claim_count, 1);
    assert_eq!(after_a.credits_required, Some(5));
    assert_eq!(after_a.status, LeadStatus::Open);

    match marketplace.claim_lead(&lead.id, &b) {
        Err(ClaimError::Ledger(LedgerError::InsufficientCredits { shortfall, .. })) => {
            assert_eq!(shortfall, 2)
        }
        other => panic!("expected insufficient credits, got {other:?}"),
    }
    assert_eq!(total_credits(&marketplace, &b.id), 3);
    assert_eq!(marketplace.lead(&lead.id).expect("lead").claim_count, 1);

    marketplace.claim_lead(&lead.id, &c).expect("C claims");
    let full = marketplace.lead(&lead.id).expect("lead");
    assert_eq!(full.claim_count, 2);
    assert_eq!(full.status, LeadStatus::Full);
    assert_eq!(total_credits(&marketplace, &c.id), 0);

    assert!(matches!(
        marketplace.claim_lead(&lead.id, &d),
        Err(ClaimError::LeadFull)
    ));
    assert!(matches!(
        marketplace.claim_lead(&lead.id, &a),
        Err(ClaimError::AlreadyClaimed)
    ));
    assert_eq!(total_credits(&marketplace, &d.id), 50);
}

#[test]
fn first_claim_freezes_price_for_later_claimants() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 3);
    let verified = verified_professional("v");
    let plain = professional("p");
    fund(&marketplace, &verified.id, 10);
    fund(&marketplace, &plain.id, 10);

    let first = marketplace
        .claim_lead(&lead.id, &verified)
        .expect("verified claims");
    let second = marketplace
        .claim_lead(&lead.id, &plain)
        .expect("unverified claims");

    assert_eq!(first.claim.credits_spent, 4);
    assert_eq!(second.claim.credits_spent, 4);
    assert_eq!(
        marketplace.lead(&lead.id).expect("lead").credits_required,
        Some(4)
    );
}

#[test]
fn verification_cannot_lower_a_frozen_price() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 3);
    let plain = professional("plain");
    let vetted = professional("vetted");
    fund(&marketplace, &plain.id, 10);
    fund(&marketplace, &vetted.id, 10);
    marketplace
        .set_professional_verified(&vetted.id, true)
        .expect("verification recorded");
    assert!(
        marketplace
            .professional_identity(&vetted.id)
            .expect("identity")
            .verified
    );
    assert!(
        !marketplace
            .professional_identity(&plain.id)
            .expect("identity")
            .verified
    );

    let first = marketplace
        .claim_lead_as(&lead.id, &plain.id)
        .expect("unverified claims");
    let second = marketplace
        .claim_lead_as(&lead.id, &vetted.id)
        .expect("verified claims");

    assert_eq!(first.claim.credits_spent, 5);
    assert_eq!(second.claim.credits_spent, 5);
    assert_eq!(total_credits(&marketplace, &vetted.id), 5);
}

#[test]
fn duplicate_claim_is_rejected_without_charging() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 3);
    let pro = professional("dup");
    fund(&marketplace, &pro.id, 20);

    marketplace.claim_lead(&lead.id, &pro).expect("first claim");
    assert!(matches!(
        marketplace.claim_lead(&lead.id, &pro),
        Err(ClaimError::AlreadyClaimed)
    ));

    assert_eq!(total_credits(&marketplace, &pro.id), 15);
    assert_eq!(marketplace.lead(&lead.id).expect("lead").claim_count, 1);
}

#[test]
fn claim_records_lead_claim_transaction_and_event() {
    let (marketplace, _, notifier) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("event");
    fund(&marketplace, &pro.id, 12);

    let receipt = marketplace.claim_lead(&lead.id, &pro).expect("claim");

    let entries = marketplace.transactions(&pro.id).expect("history");
    let last = entries.last().expect("claim entry");
    assert_eq!(last.kind, TransactionType::LeadClaim);
    assert_eq!(last.amount, -5);
    assert_eq!(last.related_lead_id.as_ref(), Some(&lead.id));
    assert_eq!(
        notifier.events(),
        vec![MarketplaceEvent::LeadClaimed {
            lead_id: lead.id.clone(),
            professional_id: pro.id.clone(),
            claim_id: receipt.claim.id.clone(),
        }]
    );
}

#[test]
fn refund_restores_credits_and_reopens_slot_once() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 1);
    let pro = professional("refund");
    fund(&marketplace, &pro.id, 5);

    let claim = marketplace.claim_lead(&lead.id, &pro).expect("claim").claim;
    assert_eq!(
        marketplace.lead(&lead.id).expect("lead").status,
        LeadStatus::Full
    );

    let refunded = marketplace
        .refund_claim(&claim.id, "homeowner unreachable")
        .expect("refund succeeds");
    assert!(refunded.refunded);
    assert_eq!(refunded.refund_reason.as_deref(), Some("homeowner unreachable"));

    let reopened = marketplace.lead(&lead.id).expect("lead");
    assert_eq!(reopened.claim_count, 0);
    assert_eq!(reopened.status, LeadStatus::Open);
    let view = marketplace.balance(&pro.id).expect("balance");
    assert_eq!(view.total_credits, 5);
    assert_eq!(view.free_credits, 5);
    assert_eq!(view.lifetime_refunded, 5);

    assert!(matches!(
        marketplace.refund_claim(&claim.id, "again"),
        Err(ClaimError::AlreadyRefunded)
    ));
    assert_eq!(total_credits(&marketplace, &pro.id), 5);
    marketplace.reconcile(&pro.id).expect("ledger reconciles");
}

#[test]
fn refunded_professional_may_claim_again() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("again");
    fund(&marketplace, &pro.id, 10);

    let claim = marketplace.claim_lead(&lead.id, &pro).expect("claim").claim;
    marketplace
        .refund_claim(&claim.id, "duplicate lead")
        .expect("refund");
    let second = marketplace
        .claim_lead(&lead.id, &pro)
        .expect("second claim");

    assert_ne!(second.claim.id, claim.id);
    assert_eq!(marketplace.lead(&lead.id).expect("lead").claim_count, 1);
    assert_eq!(
        marketplace.claims_for_lead(&lead.id).expect("claims").len(),
        2
    );
}

#[test]
fn refund_of_unknown_claim_is_not_found() {
    let (marketplace, _, _) = build_marketplace();

    assert!(matches!(
        marketplace.refund_claim(&ClaimId("claim-missing".to_string()), "n/a"),
        Err(ClaimError::ClaimNotFound(_))
    ));
}

#[test]
fn lead_past_deadline_is_not_claimable_before_the_sweep() {
    let (marketplace, store, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("overdue");
    fund(&marketplace, &pro.id, 20);
    backdate_deadline(&store, &lead.id);

    match marketplace.claim_lead(&lead.id, &pro) {
        Err(ClaimError::LeadNotClaimable { status }) => assert_eq!(status, "expired"),
        other => panic!("expected not claimable, got {other:?}"),
    }
    assert_eq!(total_credits(&marketplace, &pro.id), 20);
    let stored = marketplace.lead(&lead.id).expect("lead");
    assert_eq!(stored.claim_count, 0);
    assert_eq!(stored.credits_required, None);
}

#[test]
fn cancelled_lead_is_not_claimable() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("late");
    fund(&marketplace, &pro.id, 10);
    marketplace
        .cancel_lead(&lead.id, "project shelved")
        .expect("cancel");

    match marketplace.claim_lead(&lead.id, &pro) {
        Err(ClaimError::LeadNotClaimable { status }) => assert_eq!(status, "cancelled"),
        other => panic!("expected not claimable, got {other:?}"),
    }
    assert_eq!(total_credits(&marketplace, &pro.id), 10);
}

#[test]
fn direct_lead_only_accepts_its_target() {
    let (marketplace, _, _) = build_marketplace();
    let target = professional("target");
    let other = professional("other");
    fund(&marketplace, &target.id, 10);
    fund(&marketplace, &other.id, 10);
    let lead = post_direct_lead(&marketplace, &target.id);

    assert!(matches!(
        marketplace.claim_lead(&lead.id, &other),
        Err(ClaimError::LeadNotClaimable { .. })
    ));
    marketplace
        .claim_lead(&lead.id, &target)
        .expect("target claims");

    let claimed = marketplace.lead(&lead.id).expect("lead");
    assert_eq!(claimed.direct_status, Some(DirectLeadStatus::Accepted));
    assert_eq!(claimed.status, LeadStatus::Full);
    assert_eq!(total_credits(&marketplace, &other.id), 10);
}

#[test]
fn unknown_lead_is_reported() {
    let (marketplace, _, _) = build_marketplace();
    let pro = professional("ghost");

    assert!(matches!(
        marketplace.claim_lead(
            &crate::marketplace::domain::LeadId("lead-missing".to_string()),
            &pro
        ),
        Err(ClaimError::LeadNotFound(_))
    ));
}

#[test]
fn store_conflict_surfaces_without_partial_state() {
    let (seeded, store, _) = build_marketplace();
    let lead = post_lead(&seeded, 2);
    let pro = professional("conflict");
    fund(&seeded, &pro.id, 10);

    let marketplace = Marketplace::new(
        Arc::new(ConflictStore {
            inner: store.clone(),
        }),
        Arc::new(RecordingNotifier::default()),
        marketplace_config(),
    );

    assert!(matches!(
        marketplace.claim_lead(&lead.id, &pro),
        Err(ClaimError::Repository(RepositoryError::Conflict(_)))
    ));
    assert_eq!(total_credits(&seeded, &pro.id), 10);
    assert_eq!(seeded.lead(&lead.id).expect("lead").claim_count, 0);
}

#[test]
fn unavailable_store_fails_fast() {
    let marketplace: Marketplace<UnavailableStore, RecordingNotifier> = Marketplace::new(
        Arc::new(UnavailableStore),
        Arc::new(RecordingNotifier::default()),
        marketplace_config(),
    );
    let pro = professional("offline");

    assert!(matches!(
        marketplace.claim_lead(
            &crate::marketplace::domain::LeadId("lead-1".to_string()),
            &pro
        ),
        Err(ClaimError::Repository(RepositoryError::Unavailable(_)))
    ));
}

#[test]
fn separate_stores_do_not_share_state() {
    let (marketplace, _, _) = build_marketplace();
    let other = Marketplace::new(
        Arc::new(InMemoryMarketplaceStore::default()),
        Arc::new(RecordingNotifier::default()),
        marketplace_config(),
    );
    let pro = ProfessionalId("pro-isolated".to_string());
    fund(&marketplace, &pro, 4);

    assert_eq!(other.balance(&pro).expect("balance").total_credits, 0);
}
