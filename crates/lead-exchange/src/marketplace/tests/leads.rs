use super::common::*;
use chrono::{Duration, Utc};

use crate::config::MAX_CLAIMS_CEILING;
use crate::marketplace::domain::{
    BudgetBracket, DirectLeadStatus, LeadStatus, LeadType, QuoteStatus, Urgency,
};
use crate::marketplace::leads::{LeadError, CANCELLED_QUOTE_REASON};
use crate::marketplace::ledger::TransactionType;

#[test]
fn post_applies_default_max_claims() {
    let (marketplace, _, _) = build_marketplace();
    let mut request = new_lead(BudgetBracket::Under3k, Urgency::Planning, 1);
    request.max_claims = None;

    let lead = marketplace.post_lead(request).expect("lead posts");

    assert_eq!(lead.max_claims, marketplace_config().default_max_claims);
    assert_eq!(lead.status, LeadStatus::Open);
    assert_eq!(lead.lead_type, LeadType::Marketplace);
    assert_eq!(lead.claim_count, 0);
    assert_eq!(lead.credits_required, None);
    assert_eq!(marketplace.lead(&lead.id).expect("stored").id, lead.id);
}

#[test]
fn post_validates_request() {
    let (marketplace, _, _) = build_marketplace();

    let mut blank = new_lead(BudgetBracket::Under3k, Urgency::Flexible, 2);
    blank.category = "   ".to_string();
    assert!(matches!(
        marketplace.post_lead(blank),
        Err(LeadError::Validation(_))
    ));

    let mut past = new_lead(BudgetBracket::Under3k, Urgency::Flexible, 2);
    past.expires_at = Utc::now() - Duration::minutes(5);
    assert!(matches!(
        marketplace.post_lead(past),
        Err(LeadError::Validation(_))
    ));

    assert!(matches!(
        marketplace.post_lead(new_lead(BudgetBracket::Under3k, Urgency::Flexible, 0)),
        Err(LeadError::Validation(_))
    ));
    assert!(matches!(
        marketplace.post_lead(new_lead(
            BudgetBracket::Under3k,
            Urgency::Flexible,
            MAX_CLAIMS_CEILING + 1
        )),
        Err(LeadError::Validation(_))
    ));
}

#[test]
fn post_accepts_max_claims_at_the_ceiling() {
    let (marketplace, _, _) = build_marketplace();

    let lead = marketplace
        .post_lead(new_lead(
            BudgetBracket::Under3k,
            Urgency::Flexible,
            MAX_CLAIMS_CEILING,
        ))
        .expect("ceiling is allowed");
    assert_eq!(lead.max_claims, MAX_CLAIMS_CEILING);
}

#[test]
fn direct_lead_has_single_slot_and_pending_status() {
    let (marketplace, _, _) = build_marketplace();
    let target = professional("direct");

    let lead = post_direct_lead(&marketplace, &target.id);

    assert_eq!(lead.lead_type, LeadType::Direct);
    assert_eq!(lead.max_claims, 1);
    assert_eq!(lead.direct_status, Some(DirectLeadStatus::Pending));
    assert_eq!(lead.direct_professional_id, Some(target.id));
}

#[test]
fn declined_direct_lead_can_be_converted_to_marketplace() {
    let (marketplace, _, _) = build_marketplace();
    let target = professional("busy");
    let lead = post_direct_lead(&marketplace, &target.id);

    assert!(matches!(
        marketplace.decline_direct_lead(&lead.id, &professional("someone").id),
        Err(LeadError::NotTargetProfessional)
    ));
    let declined = marketplace
        .decline_direct_lead(&lead.id, &target.id)
        .expect("target declines");
    assert_eq!(declined.direct_status, Some(DirectLeadStatus::Declined));
    assert!(matches!(
        marketplace.decline_direct_lead(&lead.id, &target.id),
        Err(LeadError::DirectTransition { .. })
    ));

    let converted = marketplace
        .convert_direct_lead(&lead.id)
        .expect("homeowner converts");
    assert_eq!(converted.direct_status, Some(DirectLeadStatus::Converted));
    assert_eq!(converted.lead_type, LeadType::Marketplace);
    assert_eq!(converted.max_claims, marketplace_config().default_max_claims);
    assert_eq!(converted.status, LeadStatus::Open);

    let pro = professional("open-market");
    fund(&marketplace, &pro.id, 10);
    marketplace
        .claim_lead(&lead.id, &pro)
        .expect("converted lead is claimable by anyone");
}

#[test]
fn claimed_direct_lead_cannot_be_converted() {
    let (marketplace, _, _) = build_marketplace();
    let target = professional("eager");
    fund(&marketplace, &target.id, 10);
    let lead = post_direct_lead(&marketplace, &target.id);
    marketplace.claim_lead(&lead.id, &target).expect("claim");

    assert!(matches!(
        marketplace.convert_direct_lead(&lead.id),
        Err(LeadError::DirectTransition { .. })
    ));
}

#[test]
fn marketplace_lead_rejects_direct_transitions() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);

    assert!(matches!(
        marketplace.convert_direct_lead(&lead.id),
        Err(LeadError::NotDirect)
    ));
}

#[test]
fn cancel_refunds_claims_and_declines_pending_quotes() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let a = professional("cancel-a");
    let b = professional("cancel-b");
    fund(&marketplace, &a.id, 10);
    fund(&marketplace, &b.id, 5);
    marketplace.claim_lead(&lead.id, &a).expect("A claims");
    marketplace.claim_lead(&lead.id, &b).expect("B claims");
    let quote = marketplace
        .submit_quote(&lead.id, &a.id, submission(1_500))
        .expect("A quotes");

    let outcome = marketplace
        .cancel_lead(&lead.id, "homeowner moved")
        .expect("cancel succeeds");

    assert_eq!(outcome.refunded_claims, 2);
    assert_eq!(outcome.credits_refunded, 10);
    assert_eq!(outcome.quotes_declined, 1);
    assert_eq!(outcome.lead.status, LeadStatus::Cancelled);
    assert_eq!(outcome.lead.claim_count, 0);

    let stored = marketplace.lead(&lead.id).expect("lead");
    assert_eq!(stored.status, LeadStatus::Cancelled);
    assert_eq!(stored.cancellation_reason.as_deref(), Some("homeowner moved"));
    let declined = marketplace.quote(&quote.id).expect("quote");
    assert_eq!(declined.status, QuoteStatus::Declined);
    assert_eq!(declined.decline_reason.as_deref(), Some(CANCELLED_QUOTE_REASON));

    assert_eq!(total_credits(&marketplace, &a.id), 10);
    assert_eq!(total_credits(&marketplace, &b.id), 5);
    let refunds = marketplace
        .transactions(&a.id)
        .expect("history")
        .into_iter()
        .filter(|entry| entry.kind == TransactionType::Refund)
        .count();
    assert_eq!(refunds, 1);
    assert!(marketplace
        .claims_for_lead(&lead.id)
        .expect("claims")
        .iter()
        .all(|claim| claim.refunded));
    marketplace.reconcile(&a.id).expect("A reconciles");
    marketplace.reconcile(&b.id).expect("B reconciles");
}

#[test]
fn cancel_skips_claims_already_refunded() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("pre-refunded");
    fund(&marketplace, &pro.id, 5);
    let claim = marketplace.claim_lead(&lead.id, &pro).expect("claim").claim;
    marketplace
        .refund_claim(&claim.id, "admin reversal")
        .expect("refund");

    let outcome = marketplace
        .cancel_lead(&lead.id, "no longer needed")
        .expect("cancel succeeds");

    assert_eq!(outcome.refunded_claims, 0);
    assert_eq!(total_credits(&marketplace, &pro.id), 5);
}

#[test]
fn accepted_lead_cannot_be_cancelled() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("winner");
    fund(&marketplace, &pro.id, 10);
    marketplace.claim_lead(&lead.id, &pro).expect("claim");
    let quote = marketplace
        .submit_quote(&lead.id, &pro.id, submission(1_000))
        .expect("quote");
    marketplace.accept_quote(&quote.id).expect("accept");

    match marketplace.cancel_lead(&lead.id, "changed mind") {
        Err(LeadError::AlreadyTerminal { status }) => assert_eq!(status, "accepted"),
        other => panic!("expected terminal error, got {other:?}"),
    }
    assert_eq!(total_credits(&marketplace, &pro.id), 5);
}

#[test]
fn expiry_marks_lead_and_pending_quotes_without_refunds() {
    let (marketplace, _, _) = build_marketplace();
    let lead = post_lead(&marketplace, 2);
    let pro = professional("slow");
    fund(&marketplace, &pro.id, 10);
    marketplace.claim_lead(&lead.id, &pro).expect("claim");
    let quote = marketplace
        .submit_quote(&lead.id, &pro.id, submission(1_000))
        .expect("quote");

    let summary = marketplace
        .sweep(later(8))
        .expect("sweep succeeds");

    assert_eq!(summary.leads_expired, 1);
    assert_eq!(summary.quotes_expired, 1);
    assert_eq!(
        marketplace.lead(&lead.id).expect("lead").status,
        LeadStatus::Expired
    );
    assert_eq!(
        marketplace.quote(&quote.id).expect("quote").status,
        QuoteStatus::Expired
    );
    assert_eq!(total_credits(&marketplace, &pro.id), 5);
}
